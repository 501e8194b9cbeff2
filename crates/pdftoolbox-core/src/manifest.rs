//! Crawl log to URL manifest conversion.
//!
//! The crawler writes one JSON object per line to `pdf-urls.jl`. Each
//! object that names an `original_filename` contributes that filename and
//! its `page` URL to `pdf-urls.txt`, written as `filename\nurl\n\n`.

use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::normalize::SchemaError;
use crate::Result;

pub const INPUT_FILE_NAME: &str = "pdf-urls.jl";
pub const MANIFEST_FILE_NAME: &str = "pdf-urls.txt";

/// Parse crawl log lines into `(filename, url)` pairs in first-seen order.
///
/// A repeated filename keeps its first position and takes the last URL.
pub fn parse_url_lines(input: &str) -> std::result::Result<Vec<(String, String)>, SchemaError> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line).map_err(|e| SchemaError::InvalidLine {
            line: line_no,
            message: e.to_string(),
        })?;
        let Some(object) = value.as_object() else {
            return Err(SchemaError::InvalidLine {
                line: line_no,
                message: "expected a JSON object".into(),
            });
        };

        let Some(filename) = object.get("original_filename").and_then(Value::as_str) else {
            debug!("Line {} has no original_filename", line_no);
            continue;
        };
        let url = match object.get("page") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(SchemaError::InvalidLine {
                    line: line_no,
                    message: format!("'{filename}' has no page"),
                })
            }
        };

        match entries.iter_mut().find(|(name, _)| name == filename) {
            Some(entry) => entry.1 = url,
            None => entries.push((filename.to_string(), url)),
        }
    }

    Ok(entries)
}

pub fn render_manifest(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(filename, url)| format!("{filename}\n{url}\n\n"))
        .collect()
}

/// Convert `input` into a manifest at `output`, replacing any previous
/// manifest. Returns the number of entries written.
pub fn write_url_manifest(input: &Path, output: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(input)?;
    let entries = parse_url_lines(&text)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, render_manifest(&entries))?;

    info!("Wrote {} URLs to {}", entries.len(), output.display());
    Ok(entries.len())
}
