//! Buffered log entry types.
//!
//! An entry is captured once and never modified afterwards; the only thing
//! that can happen to it is eviction from the front of the buffer or removal
//! by a flush/clear.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Severity of an entry. Display-only: nothing is filtered by level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Bracketed label used in rendered output, e.g. `[WARN]`.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Log => "[LOG]",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Info => "[INFO]",
            LogLevel::Warn => "[WARN]",
            LogLevel::Error => "[ERROR]",
        }
    }

    /// Map an external console's native message type to a level.
    ///
    /// Browser-style consoles report `warning` rather than `warn`; anything
    /// unrecognized (`trace`, `dir`, `table`, ...) is treated as `log`.
    pub fn from_console_type(kind: &str) -> Self {
        match kind {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warning" | "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Log,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(LogLevel::Log),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Who produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// The code under test called the logger directly
    Local,
    /// Mirrored from an attached external console
    External,
}

/// How the entry's arguments are rendered at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Arguments formatted individually and joined by spaces
    Plain,
    /// `args[0]` rendered as a table, `args[1]` optionally lists the columns
    Table,
    /// `args[0]` rendered as a full structured dump
    Dump,
}

/// A single captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub args: Vec<Value>,
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    /// Group nesting depth in effect when the entry was captured
    pub group_level: usize,
    pub kind: EntryKind,
    /// Per-store sequence number, strictly increasing in insertion order
    pub seq: u64,
}

impl LogEntry {
    /// Whether the entry was mirrored from an external console.
    pub fn is_external(&self) -> bool {
        self.source == LogSource::External
    }

    /// Arguments that are plain strings, in order. Handy for assertions.
    pub fn string_args(&self) -> Vec<&str> {
        self.args.iter().filter_map(Value::as_str).collect()
    }
}
