//! Logging support
//!
//! With the `logging` feature the runner emits `tracing` events:
//!
//! - **WARN**: cancellation, a child process killed after the grace period
//! - **DEBUG**: command dispatch, pipeline and job lifecycle, errexit aborts
//! - **TRACE**: expansion results, variable assignments
//!
//! Without the feature the macros below expand to nothing.
//!
//! Assignment values and argv words pass through [`LogConfig`] first so that
//! values of secret-looking variables never reach a log line.

use std::borrow::Cow;

macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        tracing::debug!($($arg)*);
    };
}

macro_rules! log_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        tracing::trace!($($arg)*);
    };
}

macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        tracing::warn!($($arg)*);
    };
}

pub(crate) use {log_debug, log_trace, log_warn};

const SENSITIVE_NAMES: &[&str] = &[
    "PASSWORD",
    "PASSWD",
    "SECRET",
    "TOKEN",
    "KEY",
    "CREDENTIAL",
    "AUTH",
    "PRIVATE",
    "BEARER",
    "SESSION",
    "COOKIE",
    "DATABASE_URL",
];

/// Configuration for what the runner's log events may contain
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact values of sensitive-looking variables (default: true)
    pub redact_sensitive: bool,

    /// Extra variable-name fragments to redact (matched case-insensitively)
    pub redact_names: Vec<String>,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            redact_sensitive: true,
            redact_names: Vec::new(),
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable redaction (only for trusted debugging sessions)
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Add a variable-name fragment to redact
    pub fn redact_name(mut self, fragment: &str) -> Self {
        self.redact_names.push(fragment.to_uppercase());
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Whether values assigned to `name` must be hidden
    pub fn should_redact(&self, name: &str) -> bool {
        if !self.redact_sensitive {
            return false;
        }
        let upper = name.to_uppercase();
        SENSITIVE_NAMES.iter().any(|p| upper.contains(p))
            || self.redact_names.iter().any(|p| upper.contains(p.as_str()))
    }

    /// Loggable rendition of `name=value`
    pub fn assignment<'a>(&self, name: &str, value: &'a str) -> Cow<'a, str> {
        if self.should_redact(name) {
            return Cow::Borrowed("[REDACTED]");
        }
        self.value(value)
    }

    /// Sanitized and truncated value
    pub fn value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        let clean = if value.chars().any(char::is_control) {
            Cow::Owned(sanitize_for_log(value))
        } else {
            Cow::Borrowed(value)
        };
        if clean.len() <= self.max_value_length {
            return clean;
        }
        let mut end = self.max_value_length;
        while end > 0 && !clean.is_char_boundary(end) {
            end -= 1;
        }
        Cow::Owned(format!(
            "{}...[truncated {} bytes]",
            &clean[..end],
            clean.len() - end
        ))
    }
}

/// Escape characters that could forge extra log lines.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
