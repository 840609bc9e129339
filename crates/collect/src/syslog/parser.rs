// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RFC 3164 / RFC 5424 syslog parsing.
//!
//! Format detection: a leading `<PRI>` followed by `1 ` or `2 ` is RFC
//! 5424, a leading `<PRI>` otherwise is RFC 3164, anything else is a
//! parse_error record that preserves the raw bytes.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Which grammar produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfcTag {
    Rfc3164,
    Rfc5424,
    ParseError,
}

sw_core::simple_display! {
    RfcTag {
        Rfc3164 => "rfc3164",
        Rfc5424 => "rfc5424",
        ParseError => "parse_error",
    }
}

/// A parsed syslog message. `priority = facility * 8 + severity`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyslogMessage {
    pub facility: Option<u8>,
    pub severity: Option<u8>,
    pub priority: Option<u16>,
    pub version: Option<u8>,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub process_id: Option<String>,
    pub message_id: Option<String>,
    pub structured_data: BTreeMap<String, BTreeMap<String, String>>,
    pub message: String,
    pub rfc: RfcTag,
    pub raw_message: String,
}

impl SyslogMessage {
    fn parse_error(raw: &str) -> Self {
        Self {
            facility: None,
            severity: None,
            priority: None,
            version: None,
            timestamp: None,
            hostname: None,
            app_name: None,
            process_id: None,
            message_id: None,
            structured_data: BTreeMap::new(),
            message: raw.to_string(),
            rfc: RfcTag::ParseError,
            raw_message: raw.to_string(),
        }
    }

    /// Public fields as a flat event map.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("facility".to_string(), opt_num(self.facility));
        fields.insert("severity".to_string(), opt_num(self.severity));
        fields.insert("priority".to_string(), opt_num(self.priority));
        fields.insert("version".to_string(), opt_num(self.version));
        fields.insert(
            "timestamp".to_string(),
            self.timestamp
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        fields.insert("hostname".to_string(), opt_str(&self.hostname));
        fields.insert("app_name".to_string(), opt_str(&self.app_name));
        fields.insert("process_id".to_string(), opt_str(&self.process_id));
        fields.insert("message_id".to_string(), opt_str(&self.message_id));
        let sd: Map<String, Value> = self
            .structured_data
            .iter()
            .map(|(id, params)| {
                let inner: Map<String, Value> = params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                (id.clone(), Value::Object(inner))
            })
            .collect();
        fields.insert("structured_data".to_string(), Value::Object(sd));
        fields.insert("message".to_string(), Value::String(self.message.clone()));
        fields.insert("rfc".to_string(), Value::String(self.rfc.to_string()));
        fields.insert("raw_message".to_string(), Value::String(self.raw_message.clone()));
        fields
    }
}

fn opt_num<N: Into<u64> + Copy>(v: Option<N>) -> Value {
    v.map(|n| Value::from(n.into())).unwrap_or(Value::Null)
}

/// Human-readable facility name per RFC 5424 section 6.2.1.
pub fn facility_name(facility: u8) -> &'static str {
    match facility {
        0 => "kernel messages",
        1 => "user-level messages",
        2 => "mail system",
        3 => "system daemons",
        4 => "security/authorization messages",
        5 => "messages generated internally by syslogd",
        6 => "line printer subsystem",
        7 => "network news subsystem",
        8 => "UUCP subsystem",
        9 => "clock daemon",
        10 => "security/authorization messages",
        11 => "FTP daemon",
        12 => "NTP subsystem",
        13 => "log audit",
        14 => "log alert",
        15 => "clock daemon",
        16..=23 => "local use facility",
        _ => "unknown",
    }
}

/// Human-readable severity name per RFC 5424 section 6.2.1.
pub fn severity_name(severity: u8) -> &'static str {
    match severity {
        0 => "Emergency",
        1 => "Alert",
        2 => "Critical",
        3 => "Error",
        4 => "Warning",
        5 => "Notice",
        6 => "Informational",
        7 => "Debug",
        _ => "unknown",
    }
}

fn opt_str(v: &Option<String>) -> Value {
    v.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Parse one raw syslog datagram or TCP frame.
pub fn parse_message(raw: &str) -> SyslogMessage {
    let raw = raw.trim_end_matches(['\r', '\n']);

    let Some((priority, rest)) = take_priority(raw) else {
        return SyslogMessage::parse_error(raw);
    };
    if priority > 191 {
        return SyslogMessage::parse_error(raw);
    }

    if rest.starts_with("1 ") || rest.starts_with("2 ") {
        parse_rfc5424(raw, priority, rest)
    } else {
        parse_rfc3164(raw, priority, rest)
    }
}

/// Extract `<PRI>` from the start of the message.
fn take_priority(raw: &str) -> Option<(u16, &str)> {
    let inner = raw.strip_prefix('<')?;
    let end = inner.find('>')?;
    if end == 0 || end > 3 {
        return None;
    }
    let priority: u16 = inner[..end].parse().ok()?;
    Some((priority, &inner[end + 1..]))
}

fn parse_rfc3164(raw: &str, priority: u16, content: &str) -> SyslogMessage {
    let mut msg = SyslogMessage {
        priority: Some(priority),
        facility: Some((priority >> 3) as u8),
        severity: Some((priority & 7) as u8),
        rfc: RfcTag::Rfc3164,
        raw_message: raw.to_string(),
        ..SyslogMessage::parse_error(raw)
    };
    msg.message = String::new();

    // Timestamp: "MMM dd HH:MM:SS" with the current year assumed
    let mut content = content;
    if let Some((timestamp, rest)) = take_rfc3164_timestamp(content) {
        msg.timestamp = Some(timestamp);
        content = rest.trim_start();
    }

    // hostname SP app[pid]: message
    let mut parts = content.splitn(2, ' ');
    if let Some(hostname) = parts.next() {
        if !hostname.is_empty() {
            msg.hostname = Some(hostname.to_string());
        }
    }
    match parts.next() {
        Some(remaining) => {
            if let Some((app_part, message)) = remaining.split_once(':') {
                msg.message = message.trim_start().to_string();
                if let Some((app, pid)) = app_part.split_once('[') {
                    msg.app_name = Some(app.to_string());
                    msg.process_id = Some(pid.trim_end_matches(']').to_string());
                } else {
                    msg.app_name = Some(app_part.to_string());
                }
            } else {
                msg.message = remaining.to_string();
            }
        }
        None => msg.message = String::new(),
    }

    msg
}

static RFC3164_TIMESTAMP: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    match regex::Regex::new(r"^([A-Za-z]{3})\s+(\d{1,2})\s+(\d{2}:\d{2}:\d{2})") {
        Ok(regex) => regex,
        Err(_) => unreachable!("timestamp pattern must compile"),
    }
});

fn take_rfc3164_timestamp(content: &str) -> Option<(DateTime<Utc>, &str)> {
    // "Oct 11 22:14:15": month, 1-2 digit day (possibly space-padded), time
    let captures = RFC3164_TIMESTAMP.captures(content)?;
    let matched = captures.get(0)?;

    let year = Utc::now().year();
    let normalized = format!("{year} {} {} {}", &captures[1], &captures[2], &captures[3]);
    let parsed = NaiveDateTime::parse_from_str(&normalized, "%Y %b %d %H:%M:%S").ok()?;
    Some((Utc.from_utc_datetime(&parsed), &content[matched.end()..]))
}

fn parse_rfc5424(raw: &str, priority: u16, content: &str) -> SyslogMessage {
    let mut msg = SyslogMessage {
        priority: Some(priority),
        facility: Some((priority >> 3) as u8),
        severity: Some((priority & 7) as u8),
        rfc: RfcTag::Rfc5424,
        raw_message: raw.to_string(),
        ..SyslogMessage::parse_error(raw)
    };
    msg.message = String::new();

    // VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP [SD] MSG
    let mut parts = content.splitn(7, ' ');

    msg.version = parts.next().and_then(|v| v.parse().ok());
    msg.timestamp = Some(parse_rfc5424_timestamp(parts.next().unwrap_or("-")));
    msg.hostname = nilable(parts.next());
    msg.app_name = nilable(parts.next());
    msg.process_id = nilable(parts.next());
    msg.message_id = nilable(parts.next());

    if let Some(rest) = parts.next() {
        if rest.starts_with('[') {
            let (sd, remaining) = parse_structured_data(rest);
            msg.structured_data = sd;
            msg.message = remaining.trim_start().to_string();
        } else if let Some(stripped) = rest.strip_prefix("- ") {
            // NILVALUE structured data
            msg.message = stripped.to_string();
        } else if rest == "-" {
            msg.message = String::new();
        } else {
            msg.message = rest.to_string();
        }
    }

    msg
}

/// `-` in any RFC 5424 header field means null.
fn nilable(part: Option<&str>) -> Option<String> {
    match part {
        None | Some("-") | Some("") => None,
        Some(s) => Some(s.to_string()),
    }
}

/// ISO-8601; `-` or unparseable falls back to now.
fn parse_rfc5424_timestamp(timestamp: &str) -> DateTime<Utc> {
    if timestamp == "-" {
        return Utc::now();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, format) {
            return Utc.from_utc_datetime(&naive);
        }
    }
    Utc::now()
}

/// Parse `[SD-ID k="v" ...]` blocks (multiple permitted, quoted values with
/// `\"`, `\\`, and `\]` escapes). Returns the parsed blocks and the
/// remainder of the message.
pub fn parse_structured_data(input: &str) -> (BTreeMap<String, BTreeMap<String, String>>, &str) {
    let mut blocks = BTreeMap::new();
    let mut rest = input;

    while let Some(stripped) = rest.strip_prefix('[') {
        let Some((sd_id, mut inner)) = take_sd_name(stripped) else { break };
        let mut params = BTreeMap::new();

        loop {
            inner = inner.trim_start();
            if let Some(after) = inner.strip_prefix(']') {
                rest = after;
                break;
            }
            let Some((key, value, after)) = take_sd_param(inner) else {
                // Malformed block: stop consuming, keep what we have
                return (blocks, rest);
            };
            params.insert(key, value);
            inner = after;
        }

        blocks.insert(sd_id, params);
        rest = rest.trim_start_matches(' ');
        if !rest.starts_with('[') {
            break;
        }
    }

    (blocks, rest)
}

fn take_sd_name(input: &str) -> Option<(String, &str)> {
    let end = input.find([' ', ']'])?;
    if end == 0 {
        return None;
    }
    Some((input[..end].to_string(), &input[end..]))
}

fn take_sd_param(input: &str) -> Option<(String, String, &str)> {
    let eq = input.find('=')?;
    let key = input[..eq].to_string();
    let after_eq = input[eq + 1..].strip_prefix('"')?;

    let mut value = String::new();
    let mut chars = after_eq.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return Some((key, value, &after_eq[i + 1..])),
            other => value.push(other),
        }
    }
    None
}

/// Serialize structured data back to its bracketed wire form.
///
/// Inverse of [`parse_structured_data`] on the id/key/quoted-value subset.
pub fn emit_structured_data(blocks: &BTreeMap<String, BTreeMap<String, String>>) -> String {
    let mut out = String::new();
    for (sd_id, params) in blocks {
        out.push('[');
        out.push_str(sd_id);
        for (key, value) in params {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            for c in value.chars() {
                if matches!(c, '"' | '\\' | ']') {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
        out.push(']');
    }
    out
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
