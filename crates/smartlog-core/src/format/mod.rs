//! Deterministic text rendering for buffered entries.
//!
//! Everything here is pure: the same entries always render to the same
//! text. Console and attachment output share [`render_entry`], and differ
//! only in the [`Palette`] and the framing around the block.
//!
//! ```text
//! 14:30:45.123 [INFO]   [EXTERNAL] page loaded
//! ^ timestamp  ^ level  ^ indent (2 spaces per group level)
//! ```

mod json;
mod table;

pub use json::{safe_serialize, CIRCULAR};
pub use table::{format_table, EMPTY_TABLE};

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::entry::{EntryKind, LogEntry, LogLevel};
use crate::value::Value;

/// Opening banner of a console block.
pub const BANNER_OPEN: &str = "=== Smart Logger Output ===";
/// Closing banner of a console block.
pub const BANNER_CLOSE: &str = "=== End Smart Logger Output ===";
/// Title prefix of an attachment document.
pub const ATTACHMENT_TITLE: &str = "Smart Logger Output";

const RULE_WIDTH: usize = 50;
const EXTERNAL_PREFIX: &str = "[EXTERNAL] ";

/// Whether rendered text carries ANSI colour codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Plain,
    Ansi,
}

/// Format one log argument for display.
pub fn format_argument(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Error { name, message } => format!("{}: {}", name, message),
        Value::Object(_) | Value::Array(_) | Value::Opaque(_) => safe_serialize(value),
        other => other.to_string(),
    }
}

/// `HH:MM:SS.mmm`, 24-hour, UTC.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}

/// Render the content part of an entry according to its kind.
pub fn render_content(entry: &LogEntry) -> String {
    match entry.kind {
        EntryKind::Table => {
            let data = entry.args.first().cloned().unwrap_or(Value::Undefined);
            let columns = entry.args.get(1).and_then(table_columns);
            format_table(&data, columns.as_deref())
        }
        EntryKind::Dump => {
            let data = entry.args.first().cloned().unwrap_or(Value::Undefined);
            safe_serialize(&data)
        }
        EntryKind::Plain => entry
            .args
            .iter()
            .map(format_argument)
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Column list stored alongside a table entry.
fn table_columns(value: &Value) -> Option<Vec<String>> {
    let arr = value.as_array()?;
    Some(arr.items().iter().map(Value::to_string).collect())
}

/// Render a single entry as one (possibly multi-line) string.
pub fn render_entry(entry: &LogEntry, palette: Palette) -> String {
    let timestamp = format_timestamp(&entry.timestamp);
    let label = entry.level.label();
    let indent = "  ".repeat(entry.group_level);
    let source = if entry.is_external() { EXTERNAL_PREFIX } else { "" };
    let content = render_content(entry);

    match palette {
        Palette::Plain => format!("{} {} {}{}{}", timestamp, label, indent, source, content),
        Palette::Ansi => format!(
            "{} {} {}{}{}",
            timestamp.bright_black(),
            colorize_label(entry.level, label),
            indent,
            source,
            content
        ),
    }
}

fn colorize_label(level: LogLevel, label: &str) -> colored::ColoredString {
    match level {
        LogLevel::Error => label.red(),
        LogLevel::Warn => label.yellow(),
        LogLevel::Info => label.blue(),
        LogLevel::Debug => label.magenta(),
        LogLevel::Log => label.white(),
    }
}

/// All entries, one rendered entry per line.
pub fn render_entries(entries: &[LogEntry], palette: Palette) -> String {
    entries
        .iter()
        .map(|e| render_entry(e, palette))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Console block framed by the banners, ready to be written as-is.
pub fn render_console_block(entries: &[LogEntry], palette: Palette) -> String {
    let (open, close) = match palette {
        Palette::Plain => (BANNER_OPEN.to_string(), BANNER_CLOSE.to_string()),
        Palette::Ansi => (BANNER_OPEN.cyan().to_string(), BANNER_CLOSE.cyan().to_string()),
    };
    format!(
        "\n{}\n{}\n{}\n\n",
        open,
        render_entries(entries, palette),
        close
    )
}

/// Self-contained attachment document for a run.
pub fn render_attachment(title: &str, entries: &[LogEntry]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!(
        "{} - {}\n{}\n\n{}\n\n{}",
        ATTACHMENT_TITLE,
        title,
        rule,
        render_entries(entries, Palette::Plain),
        rule
    )
}
