//! Configuration validation

use crate::config::{DaemonConfig, ExtentConfig, LogConfig, LogOutput};
use crate::{ConfigError, Result};
use imageio_block::MAX_LENGTH;
use std::fmt;

/// Result of configuration validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Problems that prevent the configuration from being used
    pub errors: Vec<ValidationError>,
    /// Non-blocking issues
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Creates an empty validation result
    pub const fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Returns true if there are no validation errors
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Adds a validation error
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Adds a validation warning
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Merges another validation result into this one
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Fail with all errors joined, or hand back the warnings
    pub fn into_result(self) -> Result<Vec<ValidationWarning>> {
        if self.is_valid() {
            return Ok(self.warnings);
        }
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        Err(ConfigError::Validation(messages.join("; ")))
    }
}

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The configuration field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Error classification code
    pub code: ErrorCode,
}

impl ValidationError {
    /// Creates a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.code, self.field, self.message)
    }
}

/// Validation warning details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The configuration field that triggered the warning
    pub field: String,
    /// Human-readable warning message
    pub message: String,
    /// Optional suggestion for resolving the warning
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    /// Creates a new validation warning with a suggestion for resolution
    pub fn with_suggestion(
        field: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[WARNING] {}: {}", self.field, self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (Suggestion: {s})")?;
        }
        Ok(())
    }
}

/// Error code classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A required field is missing or empty
    Required,
    /// A value is outside the acceptable range
    OutOfRange,
}

/// Validate a complete daemon configuration
pub fn validate(config: &DaemonConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.merge(validate_log(&config.log));
    result.merge(validate_extents(&config.extents));
    result
}

/// Validate logging settings
pub fn validate_log(config: &LogConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.output == LogOutput::File && config.file_path.is_none() {
        result.add_error(ValidationError::new(
            "log.file_path",
            "file_path must be set when output is 'file'",
            ErrorCode::Required,
        ));
    }

    // Missing parent directories are created when logging starts
    if let Some(ref path) = config.file_path {
        if path.file_name().is_none() {
            result.add_error(ValidationError::new(
                "log.file_path",
                format!("Not a file path: {}", path.display()),
                ErrorCode::Required,
            ));
        }
    }
    result
}

/// Validate extent query settings
pub fn validate_extents(config: &ExtentConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    let length = config.max_query_length;

    if length == 0 || length > MAX_LENGTH {
        result.add_error(ValidationError::new(
            "extents.max_query_length",
            format!("max_query_length {length} must be between 1 and {MAX_LENGTH}"),
            ErrorCode::OutOfRange,
        ));
    } else if length % 512 != 0 {
        result.add_warning(ValidationWarning::with_suggestion(
            "extents.max_query_length",
            format!("max_query_length {length} is not a multiple of 512"),
            "Servers report extents in whole sectors; unaligned queries may be split",
        ));
    }
    result
}
