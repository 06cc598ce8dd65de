//! core::logger
//!
//! Append-only file logger with secret masking.
//!
//! # Design
//!
//! The logger is an explicitly-passed handle, not process-global state.
//! Every component receives a `Logger` clone; clones share one file
//! handle. A write failure never propagates to the caller, so logging
//! can be sprinkled through failure paths without creating new ones.
//!
//! # Format
//!
//! One line per record: `[<ISO-8601 UTC>] [<LEVEL>] <message>`.
//!
//! # Masking
//!
//! Secrets are masked before the line reaches the file:
//! - structured fields whose key contains `token`, `password`, `secret`,
//!   `key`, `auth`, or `credential` are replaced with `***masked***`
//! - message substrings matching `ghp_...`, `token: <value>`, or
//!   `password: <value>` are rewritten in place

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde_json::Value;

/// Log severity, lowest to highest verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Parse a configuration string; unknown values fall back to `Info`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Key fragments whose values are always masked in structured data.
const SENSITIVE_KEY_FRAGMENTS: [&str; 6] =
    ["token", "password", "secret", "key", "auth", "credential"];

const MASK: &str = "***masked***";

fn ghp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ghp_[A-Za-z0-9]+").expect("ghp pattern is valid"))
}

fn kv_secret_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(token|password)\s*:\s*\S+").expect("kv pattern is valid")
    })
}

/// Mask secrets inside a free-form message.
pub fn mask_message(message: &str) -> String {
    let ghp_replacement = format!("ghp_{}", MASK);
    let masked = ghp_regex().replace_all(message, ghp_replacement.as_str());
    kv_secret_regex()
        .replace_all(&masked, |caps: &regex::Captures<'_>| {
            format!("{}: {}", &caps[1], MASK)
        })
        .into_owned()
}

/// Mask secrets inside structured data, recursing through objects and
/// arrays. Values under sensitive keys are replaced wholesale.
pub fn mask_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let masked = map
                .iter()
                .map(|(key, val)| {
                    let lower = key.to_ascii_lowercase();
                    if SENSITIVE_KEY_FRAGMENTS.iter().any(|frag| lower.contains(frag)) {
                        (key.clone(), Value::String(MASK.to_string()))
                    } else {
                        (key.clone(), mask_value(val))
                    }
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_value).collect()),
        Value::String(s) => Value::String(mask_message(s)),
        other => other.clone(),
    }
}

struct LoggerInner {
    file: Mutex<Option<File>>,
    level: LogLevel,
}

/// Shared logging handle.
///
/// Cheap to clone; all clones append to the same file.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Open (creating parent directories as needed) the append-only log
    /// file. When the file cannot be opened the logger degrades to a
    /// no-op rather than failing construction.
    pub fn open(path: &Path, level: LogLevel) -> Self {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let file = OpenOptions::new().create(true).append(true).open(path).ok();
        Self {
            inner: Arc::new(LoggerInner {
                file: Mutex::new(file),
                level,
            }),
        }
    }

    /// A logger that discards everything. Used in tests and early startup.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                file: Mutex::new(None),
                level: LogLevel::Error,
            }),
        }
    }

    /// The configured level.
    pub fn level(&self) -> LogLevel {
        self.inner.level
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Write one record. Records above the configured verbosity are
    /// dropped; write failures are swallowed.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level > self.inner.level {
            return;
        }
        let line = format!(
            "[{}] [{}] {}\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level.label(),
            mask_message(message)
        );
        if let Ok(mut guard) = self.inner.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    /// Write one record with structured data appended as masked JSON.
    pub fn log_with(&self, level: LogLevel, message: &str, data: &Value) {
        let masked = mask_value(data);
        self.log(level, &format!("{} {}", message, masked));
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.inner.level)
            .finish()
    }
}
