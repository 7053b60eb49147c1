//! Logger configuration.
//!
//! Options are plain data with serde support so they can be read from a
//! JSON config file. Missing keys take their defaults, so a partial
//! document behaves like "defaults overlaid with user values":
//!
//! ```json
//! { "flushTriggers": ["fail", "retry"], "maxBufferSize": 1000, "attachToReport": true }
//! ```
//!
//! `flushOn` and `capturePageConsole` are accepted as alternative names.
//! Any other unrecognised key is rejected.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SmartLogError, SmartLogResult};

/// Default eviction threshold.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1000;

/// Outcomes that can trigger an automatic flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    Fail,
    Pass,
    Skip,
    /// Expected failure that did fail
    Fixme,
    /// Any retry attempt (`retry > 0`)
    Retry,
    Timeout,
}

impl FlushTrigger {
    pub const ALL: [FlushTrigger; 6] = [
        FlushTrigger::Fail,
        FlushTrigger::Pass,
        FlushTrigger::Skip,
        FlushTrigger::Fixme,
        FlushTrigger::Retry,
        FlushTrigger::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Fail => "fail",
            FlushTrigger::Pass => "pass",
            FlushTrigger::Skip => "skip",
            FlushTrigger::Fixme => "fixme",
            FlushTrigger::Retry => "retry",
            FlushTrigger::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlushTrigger {
    type Err = SmartLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlushTrigger::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| SmartLogError::Config(format!("unknown flush trigger: {:?}", s)))
    }
}

/// Options recognised by the logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SmartLogOptions {
    /// Outcomes that cause an automatic flush (default: fail, retry)
    #[serde(rename = "flushTriggers", alias = "flushOn")]
    pub flush_on: BTreeSet<FlushTrigger>,

    /// Maximum number of entries kept in the buffer (default: 1000)
    pub max_buffer_size: usize,

    /// Mirror messages from an attached external console (default: false)
    #[serde(alias = "capturePageConsole")]
    pub capture_external_console: bool,

    /// Also hand each flushed block to the attachment sink (default: false)
    pub attach_to_report: bool,
}

impl Default for SmartLogOptions {
    fn default() -> Self {
        Self {
            flush_on: [FlushTrigger::Fail, FlushTrigger::Retry].into_iter().collect(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            capture_external_console: false,
            attach_to_report: false,
        }
    }
}

impl SmartLogOptions {
    /// Parse options from JSON, filling missing keys with defaults.
    pub fn from_json_str(json: &str) -> SmartLogResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> SmartLogResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Reject values that would make the buffer unusable.
    pub fn validate(&self) -> SmartLogResult<()> {
        if self.max_buffer_size == 0 {
            return Err(SmartLogError::Config(
                "maxBufferSize must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the flush trigger set.
    pub fn with_flush_on(mut self, triggers: impl IntoIterator<Item = FlushTrigger>) -> Self {
        self.flush_on = triggers.into_iter().collect();
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    pub fn with_external_console(mut self, enabled: bool) -> Self {
        self.capture_external_console = enabled;
        self
    }

    pub fn with_attach_to_report(mut self, enabled: bool) -> Self {
        self.attach_to_report = enabled;
        self
    }

    /// Whether `trigger` is configured.
    pub fn flushes_on(&self, trigger: FlushTrigger) -> bool {
        self.flush_on.contains(&trigger)
    }
}

/// Parse a comma-separated trigger list such as `fail,retry`.
pub fn parse_trigger_list(list: &str) -> SmartLogResult<BTreeSet<FlushTrigger>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(FlushTrigger::from_str)
        .collect()
}
