//! Plain-text output of the command-line modes.

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};

use super::summary::ReceiptSummary;
use crate::domain::entities::field_record::FieldRecord;

const BANNER_WIDTH: usize = 80;

/// `title` centered in a line of `=`.
pub fn banner(title: &str) -> String {
    let title = format!(" {title} ");
    let fill = BANNER_WIDTH.saturating_sub(title.len());
    let left = fill.div_ceil(2);
    format!("{}{title}{}", "=".repeat(left), "=".repeat(fill - left))
}

pub fn render_summary(summary: &ReceiptSummary) -> String {
    let width = summary
        .lines
        .iter()
        .map(|line| line.name.len())
        .max()
        .unwrap_or(0);
    let mut out = banner("Receipt Summary");
    out.push('\n');
    for line in &summary.lines {
        out.push_str(&format!(
            "{:<width$}: {}\n",
            line.name,
            line.value,
            width = width + 1
        ));
    }
    out
}

/// Sorted, 4-space indented JSON. `latest_receipt` is removed from the top
/// level: it is the whole receipt again and drowns everything else.
pub fn pretty_json(value: &Value) -> String {
    let mut value = value.clone();
    if let Value::Object(map) = &mut value {
        map.remove("latest_receipt");
    }
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

pub fn render_dump(title: &str, value: &Value) -> String {
    format!("{}\n{}\n", banner(title), pretty_json(value))
}

/// One line per decoded record, nested purchases excluded.
pub fn render_fields(records: &[FieldRecord]) -> String {
    let mut out = banner("Receipt Fields");
    out.push('\n');
    for record in records {
        out.push_str(&format!(
            "{:>6} v{:<3} {:<12} {}\n",
            record.field_id,
            record.version,
            format!("{:?}", record.field_type),
            preview(record)
        ));
    }
    out
}

fn preview(record: &FieldRecord) -> String {
    match std::str::from_utf8(record.content()) {
        Ok(text) if !text.chars().any(char::is_control) => format!("{text:?}"),
        _ => {
            let hex: String = record
                .content()
                .iter()
                .take(16)
                .map(|b| format!("{b:02x}"))
                .collect();
            if record.content().len() > 16 {
                format!("{hex}... ({} bytes)", record.content().len())
            } else {
                hex
            }
        }
    }
}
