//! # Configuration Loader
//!
//! Loads `CoreConfig` from a YAML document, merging environment-specific
//! overrides from an `environments:` section over the base values. The active
//! environment is taken from `MARKETSYNC_ENV` (falling back to `APP_ENV`, then
//! `development`).
//!
//! ```yaml
//! scheduler:
//!   tick_interval_ms: 500
//! cache:
//!   primary_backend: memory
//! environments:
//!   production:
//!     cache:
//!       primary_backend: postgres
//! ```

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable pointing at an explicit config file.
const CONFIG_PATH_ENV: &str = "MARKETSYNC_CONFIG";

/// Loaded configuration plus the environment it was resolved for.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<CoreConfig>,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration using environment detection. When no config file is
    /// present, validated defaults are used.
    pub fn load() -> Result<Self> {
        let environment = detect_environment();
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(Path::new(&path), &environment),
            Err(_) => {
                let default_path = Path::new("config/marketsync.yaml");
                if default_path.exists() {
                    Self::load_from_file(default_path, &environment)
                } else {
                    debug!(
                        environment = %environment,
                        "No configuration file found, using defaults"
                    );
                    let config = CoreConfig::default();
                    config.validate()?;
                    Ok(Self {
                        config: Arc::new(config),
                        environment,
                        source_path: None,
                    })
                }
            }
        }
    }

    /// Load configuration from an explicit file for an explicit environment.
    pub fn load_from_file(path: &Path, environment: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigurationError(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::parse_yaml(&content, environment)?;

        info!(
            environment = %environment,
            path = %path.display(),
            primary_backend = %config.cache.primary_backend,
            "🔧 Configuration loaded"
        );

        Ok(Self {
            config: Arc::new(config),
            environment: environment.to_string(),
            source_path: Some(path.to_path_buf()),
        })
    }

    /// Parse a YAML document, merging `environments.<env>` overrides.
    pub fn parse_yaml(content: &str, environment: &str) -> Result<CoreConfig> {
        let mut root: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid YAML: {e}")))?;

        if let YamlValue::Mapping(ref mut mapping) = root {
            let overrides = mapping
                .remove(YamlValue::String("environments".to_string()))
                .and_then(|envs| match envs {
                    YamlValue::Mapping(mut envs) => {
                        envs.remove(YamlValue::String(environment.to_string()))
                    }
                    _ => None,
                });
            if let Some(overrides) = overrides {
                merge_yaml(&mut root, overrides);
            }
        }

        let config: CoreConfig = serde_yaml::from_value(root)
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn config_arc(&self) -> Arc<CoreConfig> {
        Arc::clone(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

/// Deep-merge `overlay` into `base`; mappings merge recursively, everything
/// else is replaced.
fn merge_yaml(base: &mut YamlValue, overlay: YamlValue) {
    match (base, overlay) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

fn detect_environment() -> String {
    std::env::var("MARKETSYNC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
scheduler:
  tick_interval_ms: 250
  zombie_threshold_minutes: 15
cache:
  primary_backend: file
  cache_dir: /tmp/msync-cache
rate_limits:
  safety_margin: 0.9
  providers:
    tushare:
      tier: premium
environments:
  production:
    cache:
      primary_backend: postgres
    database:
      enabled: true
      url: postgresql://db.internal/marketsync
"#;

    #[test]
    fn parses_base_document() {
        let config = ConfigManager::parse_yaml(SAMPLE, "development").unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert_eq!(config.scheduler.zombie_threshold_minutes, 15);
        assert_eq!(config.cache.primary_backend, "file");
        assert_eq!(config.rate_limits.providers["tushare"].tier.as_deref(), Some("premium"));
        assert!(!config.database.enabled);
    }

    #[test]
    fn environment_overrides_merge_over_base() {
        let config = ConfigManager::parse_yaml(SAMPLE, "production").unwrap();
        assert_eq!(config.cache.primary_backend, "postgres");
        // Untouched base values survive the merge
        assert_eq!(config.cache.cache_dir, "/tmp/msync-cache");
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert!(config.database.enabled);
        assert_eq!(config.database.url, "postgresql://db.internal/marketsync");
    }

    #[test]
    fn invalid_yaml_is_a_configuration_error() {
        let err = ConfigManager::parse_yaml(": not yaml :", "development").unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn merged_config_is_still_validated() {
        let doc = r#"
cache:
  primary_backend: memory
environments:
  test:
    cache:
      primary_backend: redis
"#;
        assert!(ConfigManager::parse_yaml(doc, "test").is_err());
        assert!(ConfigManager::parse_yaml(doc, "development").is_ok());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = ConfigManager::parse_yaml("{}", "development").unwrap();
        assert_eq!(config.cache.primary_backend, "memory");
        assert_eq!(config.scheduler.zombie_threshold_minutes, 30);
    }
}
