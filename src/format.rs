use std::path::Path;

use chrono::{DateTime, Local, Utc};

use crate::models::CheckResult;

/// File name component for display, falling back to the whole path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// One-line summary, e.g. `✗ Upscale Check: [Failed] song.mp3 - Actual 128kbps vs declared 320kbps`.
pub fn format_console_line(path: &Path, result: &CheckResult) -> String {
    format!(
        "{} Upscale Check: [{}] {} - {}",
        result.status.glyph(),
        result.status,
        display_name(path),
        result.reason
    )
}

fn format_local_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Line appended to a sidecar log.
pub fn format_sidecar_line(path: &Path, result: &CheckResult) -> String {
    format!(
        "[{}] [{}] {} - {}",
        format_local_time(result.timestamp),
        result.status,
        display_name(path),
        result.reason
    )
}

fn kbps_cell(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Format cached results as a table.
pub fn format_table<'a>(entries: impl IntoIterator<Item = (&'a str, &'a CheckResult)>) -> String {
    let separator = "\u{2500}".repeat(72);
    let mut output = String::new();

    output.push_str(&format!(
        "{:<8} {:>9} {:>9} {:>19}  {}\n",
        "Status", "Declared", "Measured", "Checked", "File"
    ));
    output.push_str(&separator);
    output.push('\n');

    let mut count = 0usize;
    for (path, result) in entries {
        output.push_str(&format!(
            "{:<8} {:>9} {:>9} {:>19}  {}\n",
            result.status.to_string(),
            kbps_cell(result.declared_kbps),
            kbps_cell(result.measured_kbps),
            format_local_time(result.timestamp),
            path,
        ));
        output.push_str(&format!("{:<8} {}\n", "", result.reason));
        count += 1;
    }

    output.push_str(&separator);
    output.push('\n');
    output.push_str(&format!("Number of files: {}", count));
    output
}

/// Format cached results as a pretty-printed JSON object keyed by path.
pub fn format_json<'a>(entries: impl IntoIterator<Item = (&'a str, &'a CheckResult)>) -> String {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .filter_map(|(path, result)| {
            serde_json::to_value(result)
                .ok()
                .map(|value| (path.to_string(), value))
        })
        .collect();
    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
}
