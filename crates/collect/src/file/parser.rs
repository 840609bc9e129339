// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log line parsing for the file collector.
//!
//! `auto` tries a fixed priority list of patterns and tags the match with
//! `_pattern`; `json` and `csv` have dedicated decoders; any other name
//! applies that one pattern (falling back to auto detection on miss).

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Pattern priority order for `auto` detection.
static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "apache_combined",
            r#"^(?P<remote_addr>\S+) \S+ (?P<remote_user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<method>\S+) (?P<url>\S+) (?P<protocol>\S+)" (?P<status>\d+) (?P<bytes_sent>\S+) "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)"$"#,
        ),
        (
            "apache_common",
            r#"^(?P<remote_addr>\S+) \S+ (?P<remote_user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<method>\S+) (?P<url>\S+) (?P<protocol>\S+)" (?P<status>\d+) (?P<bytes_sent>\S+)$"#,
        ),
        (
            "nginx",
            r#"^(?P<remote_addr>\S+) - (?P<remote_user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<method>\S+) (?P<url>\S+) (?P<protocol>\S+)" (?P<status>\d+) (?P<bytes_sent>\S+) "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)"$"#,
        ),
        (
            "syslog",
            r"^(?P<timestamp>\w+\s+\d+\s+\d+:\d+:\d+) (?P<hostname>\S+) (?P<process>\S+?)(?:\[(?P<pid>\d+)\])?: (?P<message>.*)$",
        ),
        (
            "timestamp_message",
            r"^(?P<timestamp>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?) (?P<level>\w+)?\s*(?P<message>.*)$",
        ),
        ("json", r"^\{.*\}$"),
        ("csv", r"^[^,]+(?:,[^,]*)*$"),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            // Patterns are literals exercised by tests
            Err(_) => unreachable!("built-in log pattern must compile"),
        };
        (name, regex)
    })
    .collect()
});

/// Parse one line under the configured `log_format`.
pub fn parse_line(line: &str, log_format: &str, csv_headers: &[String]) -> Map<String, Value> {
    match log_format {
        "json" => parse_json_line(line),
        "csv" => parse_csv_line(line, csv_headers),
        "auto" => parse_auto(line, None),
        name => parse_auto(line, Some(name)),
    }
}

fn parse_auto(line: &str, preferred: Option<&str>) -> Map<String, Value> {
    if line.trim().is_empty() {
        return Map::new();
    }

    if let Some(name) = preferred {
        if let Some((_, regex)) = PATTERNS.iter().find(|(n, _)| *n == name) {
            if let Some(fields) = capture_fields(regex, line) {
                return fields;
            }
        }
    }

    for (name, regex) in PATTERNS.iter() {
        if let Some(mut fields) = capture_fields(regex, line) {
            fields.insert("_pattern".to_string(), Value::String((*name).to_string()));
            return fields;
        }
    }

    let mut fields = Map::new();
    fields.insert("message".to_string(), Value::String(line.to_string()));
    fields.insert("raw_line".to_string(), Value::String(line.to_string()));
    fields.insert("_pattern".to_string(), Value::String("unknown".to_string()));
    fields
}

fn capture_fields(regex: &Regex, line: &str) -> Option<Map<String, Value>> {
    let captures = regex.captures(line)?;
    let mut fields = Map::new();
    for name in regex.capture_names().flatten() {
        if let Some(m) = captures.name(name) {
            fields.insert(name.to_string(), Value::String(m.as_str().to_string()));
        }
    }
    Some(fields)
}

/// Decode a JSON object line; non-JSON lines become a parse_error record.
pub fn parse_json_line(line: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut fields = Map::new();
            fields.insert("message".to_string(), Value::String(line.to_string()));
            fields.insert("parse_error".to_string(), Value::String("invalid_json".to_string()));
            fields
        }
    }
}

/// Map CSV columns by configured headers, or `field_N` keys on mismatch.
pub fn parse_csv_line(line: &str, headers: &[String]) -> Map<String, Value> {
    let values = split_csv(line);
    let mut fields = Map::new();

    if !headers.is_empty() && headers.len() == values.len() {
        for (header, value) in headers.iter().zip(values) {
            fields.insert(header.clone(), Value::String(value));
        }
    } else {
        for (i, value) in values.into_iter().enumerate() {
            fields.insert(format!("field_{i}"), Value::String(value));
        }
    }
    fields
}

/// Quote-aware CSV field split (double-quote escaping).
fn split_csv(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                values.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    values.push(current);
    values
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
