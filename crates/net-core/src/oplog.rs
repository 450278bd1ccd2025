//! Per-call operation log returned to callers

use chrono::{DateTime, Utc};
use log::Level;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:<5} {}",
            self.time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level,
            self.message
        )
    }
}

/// Append-only log of one engine call, mirrored to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(target: "netstate", level, "{}", message);
        self.entries.push(LogEntry {
            time: Utc::now(),
            level,
            message,
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    /// Record lines reported by a driver.
    pub fn extend_driver(&mut self, driver: &str, lines: &[String]) {
        for line in lines {
            self.push(Level::Debug, format!("[{}] {}", driver, line));
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_order() {
        let mut log = OperationLog::new();
        log.info("checkpoint created");
        log.extend_driver("memory", &["created eth1".to_string()]);
        log.warn("verification retry");

        let text = log.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("checkpoint created"));
        assert!(lines[1].contains("[memory] created eth1"));
        assert!(lines[2].contains("WARN"));
        assert!(log.contains("verification retry"));
    }
}
