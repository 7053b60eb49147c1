//! Plain-text table rendering for `table()` entries.

use crate::value::{ArrayRef, InspectError, Value};

use super::json::safe_serialize;

pub const EMPTY_TABLE: &str = "(empty table)";

const SEPARATOR: &str = " | ";
const DASHES: &str = "---";

/// Render tabular data as `" | "`-joined rows.
///
/// * null/undefined or an empty collection renders `(empty table)`.
/// * A non-array object renders a two-column `Key | Value` table.
/// * An array uses `columns` as the header, or the first element's own
///   property names. Missing or nullish cells render empty.
///
/// Any failure while reading properties falls back to the full
/// serialization of `data`.
pub fn format_table(data: &Value, columns: Option<&[String]>) -> String {
    let rendered = match data {
        Value::Undefined | Value::Null => return EMPTY_TABLE.to_string(),
        Value::Array(arr) => rows_table(data, arr, columns),
        Value::Object(_) | Value::Opaque(_) | Value::Error { .. } => key_value_table(data),
        other => return other.to_string(),
    };
    rendered.unwrap_or_else(|_| safe_serialize(data))
}

fn key_value_table(data: &Value) -> Result<String, InspectError> {
    let keys = data.own_keys()?;
    if keys.is_empty() {
        return Ok(EMPTY_TABLE.to_string());
    }

    let mut lines = vec![
        join_row(["Key", "Value"]),
        join_row([DASHES, DASHES]),
    ];
    for key in keys {
        let value = data.property(&key)?.unwrap_or(Value::Undefined);
        lines.push(format!("{}{}{}", key, SEPARATOR, value.try_to_string()?));
    }
    Ok(lines.join("\n"))
}

fn rows_table(
    data: &Value,
    arr: &ArrayRef,
    columns: Option<&[String]>,
) -> Result<String, InspectError> {
    let items = arr.items();
    let Some(first) = items.first() else {
        return Ok(EMPTY_TABLE.to_string());
    };

    let headers = match columns {
        Some(cols) => cols.to_vec(),
        None if first.is_nullish() => Vec::new(),
        None => first.own_keys()?,
    };
    if headers.is_empty() {
        return Ok(safe_serialize(data));
    }

    let mut lines = Vec::with_capacity(items.len() + 2);
    lines.push(join_row(headers.iter().map(String::as_str)));
    lines.push(join_row(headers.iter().map(|_| DASHES)));

    for item in &items {
        let mut cells = Vec::with_capacity(headers.len());
        for header in &headers {
            let cell = if item.is_nullish() {
                None
            } else {
                item.property(header)?
            };
            cells.push(match cell {
                Some(v) if !v.is_nullish() => v.try_to_string()?,
                _ => String::new(),
            });
        }
        lines.push(cells.join(SEPARATOR));
    }

    Ok(lines.join("\n"))
}

fn join_row<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells.into_iter().collect::<Vec<_>>().join(SEPARATOR)
}
