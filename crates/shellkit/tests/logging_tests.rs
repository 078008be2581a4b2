//! Log redaction
//!
//! Values of secret-looking variables must never reach a log line, and
//! values with control characters must not forge extra lines.

use pretty_assertions::assert_eq;
use shellkit::LogConfig;

#[test]
fn sensitive_names_are_redacted() {
    let config = LogConfig::new();
    for name in ["DB_PASSWORD", "github_token", "AWS_SECRET_ACCESS_KEY", "session_id"] {
        assert!(config.should_redact(name), "{name} should be redacted");
    }
    for name in ["HOME", "PATH", "USER", "count"] {
        assert!(!config.should_redact(name), "{name} should be visible");
    }
    assert_eq!(config.assignment("API_KEY", "sk-123"), "[REDACTED]");
    assert_eq!(config.assignment("HOME", "/root"), "/root");
}

#[test]
fn custom_fragments_and_opt_out() {
    let config = LogConfig::new().redact_name("internal");
    assert!(config.should_redact("MY_INTERNAL_URL"));
    let open = LogConfig::new().unsafe_disable_redaction();
    assert_eq!(open.assignment("PASSWORD", "hunter2"), "hunter2");
}

#[test]
fn values_are_sanitized_and_truncated() {
    let config = LogConfig::new().max_value_length(8);
    assert_eq!(config.value("a\nfake"), "a\\nfake");
    let long = config.value("0123456789abcdef");
    assert!(long.starts_with("01234567...[truncated 8 bytes]"), "{long}");
}

#[cfg(feature = "logging")]
mod events {
    use shellkit::ast::build::*;
    use shellkit::{LogConfig, Runner};
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::util::SubscriberInitExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn assignments_of_secrets_are_not_logged() {
        let buf = Buffer::default();
        let writer = buf.clone();
        let _guard = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish()
            .set_default();

        let mut runner = Runner::builder()
            .log_config(LogConfig::new())
            .capture()
            .build();
        let script = file(vec![assigns(vec![
            assign("DB_PASSWORD", "hunter2"),
            assign("GREETING", "visible-value"),
        ])]);
        runner.run(&script).await.unwrap();

        let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(!logs.contains("hunter2"), "{logs}");
        assert!(logs.contains("visible-value"), "{logs}");
        assert!(logs.contains("[REDACTED]"), "{logs}");
    }
}
