//! Structured logging setup

use std::sync::Mutex;

use imageio_config::{LogConfig, LogFormat, LogOutput};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::{DaemonError, DaemonResult};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed or the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> DaemonResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match config.output {
        LogOutput::Stdout => apply_fmt(config.format, std::io::stdout, filter),
        LogOutput::Stderr => apply_fmt(config.format, std::io::stderr, filter),
        LogOutput::File => {
            let path = config.file_path.as_ref().ok_or_else(|| {
                DaemonError::Logging("file_path must be set when output is 'file'".to_string())
            })?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DaemonError::Logging(format!("{}: {e}", parent.display())))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| DaemonError::Logging(format!("{}: {e}", path.display())))?;
            apply_fmt(config.format, Mutex::new(file), filter)
        }
    }
}

fn apply_fmt<W>(format: LogFormat, writer: W, filter: EnvFilter) -> DaemonResult<()>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let init_result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_writer(writer)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_writer(writer)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_writer(writer)
            .with_env_filter(filter)
            .try_init(),
    };
    init_result.map_err(|e| DaemonError::Logging(format!("Failed to init subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_output_without_path() {
        let config = LogConfig {
            output: LogOutput::File,
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(DaemonError::Logging(_))
        ));
    }
}
