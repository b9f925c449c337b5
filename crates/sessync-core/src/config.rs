//! Configuration for the replicated store and its scavenger.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scavenger (cluster-aware session GC) settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScavengerConfig {
    /// Sweep cadence in seconds.
    pub interval_secs: u64,

    /// Extra tolerance added to a session's timeout before scavenging,
    /// in seconds. A peer may hold a more recent last-access time that has
    /// not propagated yet; sweeping without this grace would prematurely
    /// expire a session still alive on another node.
    pub extra_time_secs: i64,
}

impl Default for ScavengerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            extra_time_secs: 60,
        }
    }
}

/// Replicated store settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Effective inactivity window the local scavenger applies, in
    /// seconds. Non-positive means "use each session's own max-inactive
    /// interval". Typically set larger than the session interval to absorb
    /// cluster propagation delay.
    pub actual_max_inactive_secs: i64,

    pub scavenger: ScavengerConfig,
}

impl ReplicationConfig {
    /// Validate field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scavenger.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scavenger.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.scavenger.extra_time_secs < 0 {
            return Err(ConfigError::Invalid(
                "scavenger.extra_time_secs must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// The actual-max-inactive value stamped onto newly created sessions:
    /// the configured cluster window when set, otherwise the session's own
    /// interval.
    #[must_use]
    pub fn effective_max_for(&self, max_inactive_secs: i64) -> i64 {
        if self.actual_max_inactive_secs > 0 {
            self.actual_max_inactive_secs
        } else {
            max_inactive_secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ReplicationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scavenger.interval_secs, 600);
        assert_eq!(config.scavenger.extra_time_secs, 60);
        assert_eq!(config.actual_max_inactive_secs, 0);
    }

    #[test]
    fn toml_round_trip_with_partial_fields() {
        let config = ReplicationConfig::from_toml_str(
            r#"
            actual_max_inactive_secs = 3600

            [scavenger]
            extra_time_secs = 120
            "#,
        )
        .expect("partial config parses");
        assert_eq!(config.actual_max_inactive_secs, 3600);
        assert_eq!(config.scavenger.extra_time_secs, 120);
        // Unspecified fields keep their defaults.
        assert_eq!(config.scavenger.interval_secs, 600);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let err = ReplicationConfig::from_toml_str("[scavenger]\ninterval_secs = 0")
            .expect_err("zero interval must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ReplicationConfig::from_toml_str("[scavenger]\nextra_time_secs = -5")
            .expect_err("negative grace must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn effective_max_prefers_the_cluster_window() {
        let mut config = ReplicationConfig::default();
        assert_eq!(config.effective_max_for(1800), 1800);
        config.actual_max_inactive_secs = 3600;
        assert_eq!(config.effective_max_for(1800), 3600);
    }

    #[test]
    fn load_reads_a_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sessync.toml");
        std::fs::write(&path, "actual_max_inactive_secs = 900\n").unwrap();
        let config = ReplicationConfig::load(&path).expect("file loads");
        assert_eq!(config.actual_max_inactive_secs, 900);

        let err = ReplicationConfig::load(dir.path().join("missing.toml"))
            .expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
