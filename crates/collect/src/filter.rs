// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event filter chain.
//!
//! An event passes the chain iff every filter passes. A missing field
//! resolves to null, type-incompatible comparisons evaluate false, and
//! `exclude` filters negate the match.

use regex::Regex;
use serde_json::Value;
use sw_config::{FilterOp, FilterSpec, FilterType};

/// Compiled filter chain applied to raw events.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<FilterSpec>,
}

impl FilterChain {
    pub fn new(filters: Vec<FilterSpec>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// True iff the event passes every filter.
    pub fn passes(&self, fields: &serde_json::Map<String, Value>) -> bool {
        self.filters.iter().all(|f| apply_filter(fields, f))
    }
}

fn apply_filter(fields: &serde_json::Map<String, Value>, filter: &FilterSpec) -> bool {
    if filter.field.is_empty() || filter.value.is_null() {
        return true;
    }

    let event_value = nested_value(fields, &filter.field);
    let mut result = evaluate(event_value, filter.operation, &filter.value);
    if filter.filter_type == FilterType::Exclude {
        result = !result;
    }
    result
}

fn evaluate(event_value: Option<&Value>, op: FilterOp, value: &Value) -> bool {
    match op {
        FilterOp::Equals => event_value == Some(value),
        FilterOp::NotEquals => event_value != Some(value),
        FilterOp::Contains => match event_value {
            Some(ev) => as_text(ev).contains(&as_text(value)),
            None => false,
        },
        FilterOp::NotContains => match event_value {
            Some(ev) => !as_text(ev).contains(&as_text(value)),
            None => true,
        },
        FilterOp::Regex => match event_value {
            Some(ev) => Regex::new(&as_text(value))
                .map(|re| re.is_match(&as_text(ev)))
                .unwrap_or(false),
            None => false,
        },
        FilterOp::GreaterThan => match (event_value.and_then(as_number), as_number(value)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        FilterOp::LessThan => match (event_value.and_then(as_number), as_number(value)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        FilterOp::In => match value {
            Value::Array(items) => event_value.is_some_and(|ev| items.contains(ev)),
            other => event_value == Some(other),
        },
        FilterOp::NotIn => match value {
            Value::Array(items) => !event_value.is_some_and(|ev| items.contains(ev)),
            other => event_value != Some(other),
        },
    }
}

/// Dotted-path lookup into nested objects.
fn nested_value<'a>(fields: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
