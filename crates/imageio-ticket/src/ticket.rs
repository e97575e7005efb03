//! Transfer tickets
//!
//! A ticket grants access to the bytes of one image: which operations are
//! allowed, how far into the image, and until when. Tickets are built from
//! the JSON object sent by the control plane and validated completely before
//! they can be registered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::clock::Clock;
use crate::error::{TicketError, TicketResult};

/// Url schemes a ticket may point at
pub const SUPPORTED_SCHEMES: &[&str] = &["file"];

/// Transfer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Read image data or extents
    Read,
    /// Write image data
    Write,
}

impl Op {
    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Op::Read => "read",
            Op::Write => "write",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = TicketError;

    fn from_str(s: &str) -> TicketResult<Self> {
        match s {
            "read" => Ok(Op::Read),
            "write" => Ok(Op::Write),
            _ => Err(TicketError::invalid("ops", s, "unknown operation")),
        }
    }
}

/// Access grant for one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    uuid: String,
    size: u64,
    ops: Vec<Op>,
    timeout: i64,
    expires: u64,
    url: Url,
    filename: Option<String>,
}

impl Ticket {
    /// Build a ticket from its control plane representation.
    ///
    /// Required fields are checked in order `uuid`, `size`, `ops`,
    /// `timeout`, `url`; the first missing one is reported. The deadline is
    /// `clock.now_secs() + timeout`, so a negative timeout yields a ticket
    /// that is already expired.
    pub fn from_json(value: &Value, clock: &dyn Clock) -> TicketResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| TicketError::invalid("ticket", value, "expecting an object"))?;

        let uuid = parse_uuid(required(map, "uuid")?)?;
        let size = parse_size(required(map, "size")?)?;
        let ops = parse_ops(required(map, "ops")?)?;
        let timeout = parse_timeout(required(map, "timeout")?)?;
        let url = parse_url(required(map, "url")?)?;
        let filename = match map.get("filename") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) if name.is_empty() => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(other) => {
                return Err(TicketError::invalid("filename", other, "expecting a string"))
            }
        };

        Ok(Self {
            uuid,
            size,
            ops,
            timeout,
            expires: clock.now_secs().saturating_add_signed(timeout),
            url,
            filename,
        })
    }

    /// Ticket uuid
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Number of bytes the ticket grants access to
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Allowed operations, in the order they were granted
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Check if the ticket grants `op`
    pub fn allows(&self, op: Op) -> bool {
        self.ops.contains(&op)
    }

    /// Timeout the ticket was created with, in seconds
    pub fn timeout(&self) -> i64 {
        self.timeout
    }

    /// Monotonic deadline in seconds
    pub fn expires(&self) -> u64 {
        self.expires
    }

    /// Check if the deadline has passed at `now`; reaching it counts
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires <= now
    }

    /// Image url
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Suggested download file name
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub(crate) fn set_expires(&mut self, expires: u64) {
        self.expires = expires;
    }

    /// Control plane representation
    pub fn info(&self) -> TicketInfo {
        TicketInfo {
            uuid: self.uuid.clone(),
            size: self.size,
            ops: self.ops.clone(),
            timeout: self.timeout,
            url: self.url.to_string(),
            expires: self.expires,
            filename: self.filename.clone(),
        }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops: Vec<&str> = self.ops.iter().map(Op::as_str).collect();
        write!(
            f,
            "<Ticket uuid={}, size={}, ops={:?}, timeout={}, expires={}, url={}, filename={:?}>",
            self.uuid,
            self.size,
            ops,
            self.timeout,
            self.expires,
            self.url,
            self.filename
        )
    }
}

/// Serialized ticket, as reported to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInfo {
    /// Ticket uuid
    pub uuid: String,
    /// Size in bytes
    pub size: u64,
    /// Allowed operations
    pub ops: Vec<Op>,
    /// Timeout in seconds
    pub timeout: i64,
    /// Image url
    pub url: String,
    /// Monotonic deadline in seconds
    pub expires: u64,
    /// Suggested download file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

fn required<'a>(map: &'a Map<String, Value>, key: &str) -> TicketResult<&'a Value> {
    map.get(key).ok_or_else(|| TicketError::missing(key))
}

fn parse_uuid(value: &Value) -> TicketResult<String> {
    match value {
        Value::String(uuid) if !uuid.is_empty() => Ok(uuid.clone()),
        other => Err(TicketError::invalid("uuid", other, "expecting a non-empty string")),
    }
}

fn parse_size(value: &Value) -> TicketResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| TicketError::invalid("size", value, "expecting a non-negative integer"))
}

fn parse_ops(value: &Value) -> TicketResult<Vec<Op>> {
    let items = value
        .as_array()
        .ok_or_else(|| TicketError::invalid("ops", value, "expecting a list"))?;

    let mut ops = Vec::with_capacity(items.len());
    for item in items {
        let op: Op = item
            .as_str()
            .ok_or_else(|| TicketError::invalid("ops", item, "expecting a string"))?
            .parse()?;
        if !ops.contains(&op) {
            ops.push(op);
        }
    }
    Ok(ops)
}

/// Integers and integer strings are taken as is; floats are truncated
/// toward zero, saturating at the `i64` bounds.
fn parse_timeout(value: &Value) -> TicketResult<i64> {
    let timeout = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    timeout.ok_or_else(|| TicketError::invalid("timeout", value, "expecting an integer"))
}

fn parse_url(value: &Value) -> TicketResult<Url> {
    let raw = value
        .as_str()
        .ok_or_else(|| TicketError::invalid("url", value, "expecting a string"))?;
    let url = Url::parse(raw).map_err(|e| TicketError::invalid("url", raw, e.to_string()))?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(TicketError::invalid(
            "url",
            raw,
            format!("unsupported url scheme: {}", url.scheme()),
        ));
    }
    Ok(url)
}
