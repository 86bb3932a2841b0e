//! Log structuring: turns raw log text into an immutable [`LogEntry`].
//!
//! Two input shapes are accepted:
//!
//! - **JSON objects**, whose keys are normalised through a fixed alias table
//!   (`msg` → message, `ts` → timestamp, `severity` → level, ...).
//! - **Plain text**, whose first line is matched against common
//!   `timestamp level message` layouts. Remaining lines become the stack trace.
//!
//! Structuring never consults an LLM; it is deterministic and cheap so that a
//! malformed log fails fast with a [`ValidationError`].

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::{CorrelationIds, LogEntry, LogEntryId, LogLevel, Timestamp, ValidationError};

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]+)\]\s+(\w+):?\s+(.+)$").expect("static regex")
});

static TIMESTAMP_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+(\w+):?\s+(.+)$",
    )
    .expect("static regex")
});

static LEVEL_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\w+)\s+(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+(?:-\s+)?(.+)$",
    )
    .expect("static regex")
});

static LEVEL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+):\s*(.+)$").expect("static regex"));

/// Structures one raw log.
///
/// `received_at` is used whenever the log carries no parseable timestamp.
pub fn structure_log(raw: &str, received_at: Timestamp) -> Result<LogEntry, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => return from_json(trimmed, map, received_at),
            Ok(other) => {
                return Err(ValidationError::NotAnObject {
                    found: json_kind(&other).to_string(),
                })
            }
            // Not JSON after all; fall through to text parsing.
            Err(_) => {}
        }
    }

    from_text(trimmed, received_at)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn canonical_key(key: &str) -> String {
    let lower = key.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "msg" | "text" | "error" | "description" => "message",
        "ts" | "time" | "datetime" | "created_at" | "@timestamp" => "timestamp",
        "severity" | "priority" | "type" | "loglevel" | "log_level" => "level",
        "service" | "app" | "application" | "source" | "service_name" => "service",
        "env" => "environment",
        "stack" | "stacktrace" | "trace" | "traceback" => "stack_trace",
        "user" | "userid" => "user_id",
        "session" | "sessionid" => "session_id",
        "request" | "requestid" | "correlation_id" => "request_id",
        _ => return lower,
    };
    canonical.to_string()
}

fn from_json(
    raw: &str,
    map: Map<String, Value>,
    received_at: Timestamp,
) -> Result<LogEntry, ValidationError> {
    let mut normalized = Map::new();
    for (key, value) in map {
        // First occurrence wins so an explicit `message` is not replaced by an alias.
        normalized.entry(canonical_key(&key)).or_insert(value);
    }

    let message = normalized
        .get("message")
        .and_then(value_as_text)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or(ValidationError::MissingMessage)?;

    let level = match normalized.get("level").and_then(value_as_text) {
        Some(name) => LogLevel::parse(&name).unwrap_or(LogLevel::Error),
        None => LogLevel::Info,
    };

    let timestamp = normalized
        .get("timestamp")
        .and_then(parse_json_timestamp)
        .unwrap_or(received_at);

    let text = |key: &str| {
        normalized
            .get(key)
            .and_then(value_as_text)
            .filter(|s| !s.trim().is_empty())
    };

    Ok(LogEntry {
        id: LogEntryId::new_random(),
        raw: raw.to_string(),
        timestamp,
        level,
        message,
        service: text("service"),
        environment: text("environment"),
        stack_trace: text("stack_trace"),
        correlation: CorrelationIds {
            user_id: text("user_id"),
            session_id: text("session_id"),
            request_id: text("request_id"),
        },
    })
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Array(items) => {
            let lines: Vec<String> = items.iter().filter_map(value_as_text).collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        other => Some(other.to_string()),
    }
}

fn parse_json_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            // Heuristic: values this large are epoch milliseconds.
            let millis = if secs > 1e11 { secs } else { secs * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .map(Timestamp::from_utc)
        }
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

fn from_text(raw: &str, received_at: Timestamp) -> Result<LogEntry, ValidationError> {
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or_default().trim();
    let rest: Vec<&str> = lines.collect();
    let stack_trace = Some(rest.join("\n"))
        .map(|s| s.trim_end().to_string())
        .filter(|s| !s.trim().is_empty());

    let (timestamp, level, message) = parse_first_line(first);
    let message = message.trim().to_string();
    if message.is_empty() {
        return Err(ValidationError::MissingMessage);
    }

    Ok(LogEntry {
        id: LogEntryId::new_random(),
        raw: raw.to_string(),
        timestamp: timestamp.unwrap_or(received_at),
        level: level.unwrap_or_else(|| infer_level(raw)),
        message,
        service: None,
        environment: None,
        stack_trace,
        correlation: CorrelationIds::default(),
    })
}

fn parse_first_line(line: &str) -> (Option<Timestamp>, Option<LogLevel>, String) {
    if let Some(caps) = BRACKETED.captures(line) {
        return (
            parse_timestamp(&caps[1]),
            Some(LogLevel::parse(&caps[2]).unwrap_or(LogLevel::Error)),
            caps[3].to_string(),
        );
    }
    if let Some(caps) = TIMESTAMP_FIRST.captures(line) {
        return (
            parse_timestamp(&caps[1]),
            Some(LogLevel::parse(&caps[2]).unwrap_or(LogLevel::Error)),
            caps[3].to_string(),
        );
    }
    if let Some(caps) = LEVEL_FIRST.captures(line) {
        if let Some(level) = LogLevel::parse(&caps[1]) {
            return (parse_timestamp(&caps[2]), Some(level), caps[3].to_string());
        }
    }
    if let Some(caps) = LEVEL_PREFIX.captures(line) {
        if let Some(level) = LogLevel::parse(&caps[1]) {
            return (None, Some(level), caps[2].to_string());
        }
    }
    (None, None, line.to_string())
}

/// Keyword heuristic for logs without an explicit level.
fn infer_level(text: &str) -> LogLevel {
    let lower = text.to_ascii_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["fatal", "panic"]) {
        LogLevel::Fatal
    } else if has(&["critical"]) {
        LogLevel::Critical
    } else if has(&["error", "exception", "failed", "traceback"]) {
        LogLevel::Error
    } else if has(&["warn"]) {
        LogLevel::Warning
    } else if has(&["debug"]) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Timestamp::from_utc(dt.with_timezone(&Utc)));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Timestamp::from_utc(naive.and_utc()));
        }
    }
    None
}
