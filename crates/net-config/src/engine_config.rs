//! Engine configuration

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netstate_core::ApplyFlags;

use crate::ConfigError;

/// Timeout used when none (or zero) is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_VERIFY_RETRIES: u32 = 5;
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_secs(1);

/// Where per-call log text is written.
#[derive(Clone, Default)]
pub enum LogSink {
    #[default]
    Stderr,
    Discard,
    File(PathBuf),
    Writer(Arc<Mutex<dyn Write + Send>>),
}

impl LogSink {
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        LogSink::Writer(Arc::new(Mutex::new(writer)))
    }

    /// Open the sink for one call.
    pub fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            LogSink::Stderr => Ok(Box::new(io::stderr())),
            LogSink::Discard => Ok(Box::new(io::sink())),
            LogSink::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(Box::new(file))
            }
            LogSink::Writer(shared) => Ok(Box::new(SharedWriter(shared.clone()))),
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Stderr => write!(f, "Stderr"),
            LogSink::Discard => write!(f, "Discard"),
            LogSink::File(path) => f.debug_tuple("File").field(path).finish(),
            LogSink::Writer(_) => write!(f, "Writer(..)"),
        }
    }
}

struct SharedWriter(Arc<Mutex<dyn Write + Send>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink poisoned"))?
            .flush()
    }
}

/// Options of an engine instance, assembled with the `with_*` methods and
/// validated by [`EngineConfig::build`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub timeout: Duration,
    pub log_sink: LogSink,
    pub kernel_only: bool,
    pub no_verify: bool,
    pub include_status_data: bool,
    pub include_secrets: bool,
    pub no_commit: bool,
    pub verify_retries: u32,
    pub verify_interval: Duration,
    pub auto_rollback: bool,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            log_sink: LogSink::default(),
            kernel_only: false,
            no_verify: false,
            include_status_data: false,
            include_secrets: false,
            no_commit: false,
            verify_retries: DEFAULT_VERIFY_RETRIES,
            verify_interval: DEFAULT_VERIFY_INTERVAL,
            auto_rollback: true,
            checkpoint_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_kernel_only(mut self, enabled: bool) -> Self {
        self.kernel_only = enabled;
        self
    }

    pub fn with_no_verify(mut self, enabled: bool) -> Self {
        self.no_verify = enabled;
        self
    }

    pub fn with_include_status_data(mut self, enabled: bool) -> Self {
        self.include_status_data = enabled;
        self
    }

    pub fn with_include_secrets(mut self, enabled: bool) -> Self {
        self.include_secrets = enabled;
        self
    }

    pub fn with_no_commit(mut self, enabled: bool) -> Self {
        self.no_commit = enabled;
        self
    }

    pub fn with_verify_retries(mut self, retries: u32) -> Self {
        self.verify_retries = retries;
        self
    }

    pub fn with_verify_interval(mut self, interval: Duration) -> Self {
        self.verify_interval = interval;
        self
    }

    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Validate the combination of options.
    pub fn build(mut self) -> Result<Self, ConfigError> {
        if self.kernel_only && self.no_commit {
            return Err(ConfigError::Invalid(
                "kernel_only cannot be combined with no_commit".to_string(),
            ));
        }
        if self.timeout.as_secs() > u64::from(u32::MAX) {
            return Err(ConfigError::Invalid(format!(
                "timeout of {}s exceeds {}s",
                self.timeout.as_secs(),
                u32::MAX
            )));
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        Ok(self)
    }

    pub fn flags(&self) -> ApplyFlags {
        let mut flags = ApplyFlags::empty();
        flags.set(ApplyFlags::KERNEL_ONLY, self.kernel_only);
        flags.set(ApplyFlags::NO_VERIFY, self.no_verify);
        flags.set(ApplyFlags::INCLUDE_STATUS_DATA, self.include_status_data);
        flags.set(ApplyFlags::INCLUDE_SECRETS, self.include_secrets);
        flags.set(ApplyFlags::NO_COMMIT, self.no_commit);
        flags
    }

    /// Timeout in whole seconds as passed to the engine entry points.
    pub fn timeout_seconds(&self) -> u32 {
        u32::try_from(self.timeout.as_secs()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_means_default() {
        let config = EngineConfig::new().build().unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.timeout_seconds(), 60);
    }

    #[test]
    fn test_kernel_only_conflicts_with_no_commit() {
        let result = EngineConfig::new()
            .with_kernel_only(true)
            .with_no_commit(true)
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_timeout_upper_bound() {
        let result = EngineConfig::new()
            .with_timeout(Duration::from_secs(u64::from(u32::MAX) + 1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_flags() {
        let config = EngineConfig::new()
            .with_no_verify(true)
            .with_include_secrets(true)
            .build()
            .unwrap();
        assert_eq!(
            config.flags(),
            ApplyFlags::NO_VERIFY | ApplyFlags::INCLUDE_SECRETS
        );
    }

    #[test]
    fn test_writer_sink() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = LogSink::Writer(buffer.clone());
        let mut writer = sink.open().unwrap();
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        assert_eq!(buffer.lock().unwrap().as_slice(), b"hello");
    }
}
