//! Engine settings loaded from a file and the environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine_config::{EngineConfig, LogSink, DEFAULT_VERIFY_RETRIES};
use crate::ConfigError;

/// Files probed by [`EngineSettings::load_with_defaults`], first match wins.
pub const DEFAULT_SETTINGS_PATHS: &[&str] = &["/etc/netstate/netstate.toml", "./netstate.toml"];

/// Where pending checkpoints are kept so a later process can commit or
/// roll them back.
pub const DEFAULT_CHECKPOINT_DIR: &str = "/run/netstate/checkpoints";

/// Environment variable prefix, e.g. `NETSTATE_TIMEOUT_SECONDS=30`.
pub const ENV_PREFIX: &str = "NETSTATE";

/// On-disk form of [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub timeout_seconds: u64,
    pub kernel_only: bool,
    pub no_verify: bool,
    pub include_status_data: bool,
    pub include_secrets: bool,
    pub no_commit: bool,
    pub verify_retries: u32,
    pub verify_interval_ms: u64,
    pub auto_rollback: bool,
    pub checkpoint_dir: Option<PathBuf>,
    /// Append call logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            kernel_only: false,
            no_verify: false,
            include_status_data: false,
            include_secrets: false,
            no_commit: false,
            verify_retries: DEFAULT_VERIFY_RETRIES,
            verify_interval_ms: 1000,
            auto_rollback: true,
            checkpoint_dir: Some(PathBuf::from(DEFAULT_CHECKPOINT_DIR)),
            log_file: None,
        }
    }
}

impl EngineSettings {
    /// Load settings from file, with `NETSTATE_*` environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: EngineSettings = settings.try_deserialize()?;
        Ok(settings)
    }

    /// Load from the first existing default location, falling back to
    /// defaults plus environment overrides.
    pub fn load_with_defaults() -> Result<Self, ConfigError> {
        for path in DEFAULT_SETTINGS_PATHS {
            if Path::new(path).exists() {
                match Self::load_from_file(path) {
                    Ok(settings) => return Ok(settings),
                    Err(e) => log::warn!("Failed to load settings from {}: {}", path, e),
                }
            }
        }

        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn into_engine_config(self) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::new()
            .with_timeout(Duration::from_secs(self.timeout_seconds))
            .with_kernel_only(self.kernel_only)
            .with_no_verify(self.no_verify)
            .with_include_status_data(self.include_status_data)
            .with_include_secrets(self.include_secrets)
            .with_no_commit(self.no_commit)
            .with_verify_retries(self.verify_retries)
            .with_verify_interval(Duration::from_millis(self.verify_interval_ms))
            .with_auto_rollback(self.auto_rollback);
        if let Some(dir) = self.checkpoint_dir {
            config = config.with_checkpoint_dir(dir);
        }
        if let Some(file) = self.log_file {
            config = config.with_log_sink(LogSink::File(file));
        }
        config.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "timeout_seconds = 30\nno_verify = true\nverify_retries = 2\ncheckpoint_dir = \"/tmp/cp\""
        )
        .unwrap();

        let settings = EngineSettings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.timeout_seconds, 30);
        assert!(settings.no_verify);
        assert_eq!(settings.verify_retries, 2);
        assert!(settings.auto_rollback);

        let config = settings.into_engine_config().unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.checkpoint_dir, Some(PathBuf::from("/tmp/cp")));
    }

    #[test]
    fn test_checkpoints_persist_by_default() {
        let settings = EngineSettings::default();
        assert_eq!(
            settings.checkpoint_dir.as_deref(),
            Some(Path::new(DEFAULT_CHECKPOINT_DIR))
        );
        let config = settings.into_engine_config().unwrap();
        assert_eq!(
            config.checkpoint_dir,
            Some(PathBuf::from(DEFAULT_CHECKPOINT_DIR))
        );
    }

    #[test]
    fn test_invalid_combination_rejected() {
        let settings = EngineSettings {
            kernel_only: true,
            no_commit: true,
            ..Default::default()
        };
        assert!(settings.into_engine_config().is_err());
    }
}
