//! Layered configuration: compiled-in defaults overridden by an optional TOML
//! file, cascading CWD over the platform config directory. The library itself
//! never reads the environment or the filesystem implicitly — callers resolve
//! a [`Config`] (typically via [`load_config_file`] plus their own env
//! handling) and pass it into the core explicitly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{ResilienceConfig, ValidationConfig};

/// On-disk TOML configuration. All fields optional so partial configs merge
/// cleanly with compiled-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub databases: Option<DatabasesConfig>,
    pub retry: Option<RetryConfig>,
    pub circuit: Option<CircuitConfig>,
    pub validation: Option<ValidationConfigFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub pubmed_api_key: Option<String>,
    pub elsevier_api_key: Option<String>,
    pub mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabasesConfig {
    pub enabled: Option<Vec<String>>,
    pub max_results_per_database: Option<u32>,
    pub search_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfigFile {
    pub min_publications: Option<u32>,
    pub max_retractions: Option<u32>,
    pub min_recent_publications: Option<u32>,
    pub recent_years: Option<u32>,
    pub check_institutional_conflicts: Option<bool>,
    pub check_co_author_conflicts: Option<bool>,
    pub collaboration_years: Option<u32>,
}

/// Platform config directory path: `<config_dir>/reviewer/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reviewer").join("config.toml"))
}

/// Load config by cascading CWD `.reviewer.toml` over platform config; CWD
/// values override platform values, matching this workspace's established
/// config-cascade convention.
pub fn load_config_file() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".reviewer.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`, per
/// sub-table (a sub-table present only in `base` is not discarded just
/// because `overlay` omits it entirely).
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            pubmed_api_key: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.pubmed_api_key.clone())
                .or_else(|| base.api_keys.as_ref().and_then(|a| a.pubmed_api_key.clone())),
            elsevier_api_key: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.elsevier_api_key.clone())
                .or_else(|| {
                    base.api_keys
                        .as_ref()
                        .and_then(|a| a.elsevier_api_key.clone())
                }),
            mailto: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.mailto.clone())
                .or_else(|| base.api_keys.as_ref().and_then(|a| a.mailto.clone())),
        }),
        databases: Some(DatabasesConfig {
            enabled: overlay
                .databases
                .as_ref()
                .and_then(|d| d.enabled.clone())
                .or_else(|| base.databases.as_ref().and_then(|d| d.enabled.clone())),
            max_results_per_database: overlay
                .databases
                .as_ref()
                .and_then(|d| d.max_results_per_database)
                .or_else(|| {
                    base.databases
                        .as_ref()
                        .and_then(|d| d.max_results_per_database)
                }),
            search_timeout_ms: overlay
                .databases
                .as_ref()
                .and_then(|d| d.search_timeout_ms)
                .or_else(|| base.databases.as_ref().and_then(|d| d.search_timeout_ms)),
        }),
        retry: Some(RetryConfig {
            max_attempts: overlay
                .retry
                .as_ref()
                .and_then(|r| r.max_attempts)
                .or_else(|| base.retry.as_ref().and_then(|r| r.max_attempts)),
            base_delay_ms: overlay
                .retry
                .as_ref()
                .and_then(|r| r.base_delay_ms)
                .or_else(|| base.retry.as_ref().and_then(|r| r.base_delay_ms)),
            max_delay_ms: overlay
                .retry
                .as_ref()
                .and_then(|r| r.max_delay_ms)
                .or_else(|| base.retry.as_ref().and_then(|r| r.max_delay_ms)),
            backoff_multiplier: overlay
                .retry
                .as_ref()
                .and_then(|r| r.backoff_multiplier)
                .or_else(|| base.retry.as_ref().and_then(|r| r.backoff_multiplier)),
        }),
        circuit: Some(CircuitConfig {
            failure_threshold: overlay
                .circuit
                .as_ref()
                .and_then(|c| c.failure_threshold)
                .or_else(|| base.circuit.as_ref().and_then(|c| c.failure_threshold)),
            reset_timeout_ms: overlay
                .circuit
                .as_ref()
                .and_then(|c| c.reset_timeout_ms)
                .or_else(|| base.circuit.as_ref().and_then(|c| c.reset_timeout_ms)),
        }),
        validation: Some(ValidationConfigFile {
            min_publications: overlay
                .validation
                .as_ref()
                .and_then(|v| v.min_publications)
                .or_else(|| base.validation.as_ref().and_then(|v| v.min_publications)),
            max_retractions: overlay
                .validation
                .as_ref()
                .and_then(|v| v.max_retractions)
                .or_else(|| base.validation.as_ref().and_then(|v| v.max_retractions)),
            min_recent_publications: overlay
                .validation
                .as_ref()
                .and_then(|v| v.min_recent_publications)
                .or_else(|| {
                    base.validation
                        .as_ref()
                        .and_then(|v| v.min_recent_publications)
                }),
            recent_years: overlay
                .validation
                .as_ref()
                .and_then(|v| v.recent_years)
                .or_else(|| base.validation.as_ref().and_then(|v| v.recent_years)),
            check_institutional_conflicts: overlay
                .validation
                .as_ref()
                .and_then(|v| v.check_institutional_conflicts)
                .or_else(|| {
                    base.validation
                        .as_ref()
                        .and_then(|v| v.check_institutional_conflicts)
                }),
            check_co_author_conflicts: overlay
                .validation
                .as_ref()
                .and_then(|v| v.check_co_author_conflicts)
                .or_else(|| {
                    base.validation
                        .as_ref()
                        .and_then(|v| v.check_co_author_conflicts)
                }),
            collaboration_years: overlay
                .validation
                .as_ref()
                .and_then(|v| v.collaboration_years)
                .or_else(|| {
                    base.validation
                        .as_ref()
                        .and_then(|v| v.collaboration_years)
                }),
        }),
    }
}

/// Resolved, constructor-ready configuration. Built by applying a
/// [`ConfigFile`] (if any) over compiled-in defaults; this is the shape the
/// core's public operations accept.
#[derive(Clone)]
pub struct Config {
    pub enabled_databases: Vec<String>,
    pub pubmed_api_key: Option<String>,
    pub elsevier_api_key: Option<String>,
    pub mailto: Option<String>,
    pub max_results_per_database: u32,
    pub search_timeout: Duration,
    pub resilience: ResilienceConfig,
    pub validation: ValidationConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("enabled_databases", &self.enabled_databases)
            .field("pubmed_api_key", &self.pubmed_api_key.as_ref().map(|_| "***"))
            .field(
                "elsevier_api_key",
                &self.elsevier_api_key.as_ref().map(|_| "***"),
            )
            .field("mailto", &self.mailto.as_ref().map(|_| "***"))
            .field(
                "max_results_per_database",
                &self.max_results_per_database,
            )
            .field("search_timeout", &self.search_timeout)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_databases: vec![
                "PUBMED".to_string(),
                "ELSEVIER".to_string(),
                "WILEY".to_string(),
                "TAYLOR_FRANCIS".to_string(),
            ],
            pubmed_api_key: None,
            elsevier_api_key: None,
            mailto: None,
            max_results_per_database: 100,
            search_timeout: Duration::from_millis(300_000),
            resilience: ResilienceConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    /// Apply a parsed [`ConfigFile`] on top of the compiled-in defaults.
    pub fn with_file(mut self, file: ConfigFile) -> Self {
        if let Some(keys) = file.api_keys {
            self.pubmed_api_key = keys.pubmed_api_key.or(self.pubmed_api_key);
            self.elsevier_api_key = keys.elsevier_api_key.or(self.elsevier_api_key);
            self.mailto = keys.mailto.or(self.mailto);
        }
        if let Some(dbs) = file.databases {
            if let Some(enabled) = dbs.enabled {
                self.enabled_databases = enabled;
            }
            if let Some(max) = dbs.max_results_per_database {
                self.max_results_per_database = max;
            }
            if let Some(ms) = dbs.search_timeout_ms {
                self.search_timeout = Duration::from_millis(ms);
            }
        }
        if let Some(retry) = file.retry {
            if let Some(v) = retry.max_attempts {
                self.resilience.max_attempts = v;
            }
            if let Some(v) = retry.base_delay_ms {
                self.resilience.base_delay = Duration::from_millis(v);
            }
            if let Some(v) = retry.max_delay_ms {
                self.resilience.max_delay = Duration::from_millis(v);
            }
            if let Some(v) = retry.backoff_multiplier {
                self.resilience.backoff_multiplier = v;
            }
        }
        if let Some(circuit) = file.circuit {
            if let Some(v) = circuit.failure_threshold {
                self.resilience.failure_threshold = v;
            }
            if let Some(v) = circuit.reset_timeout_ms {
                self.resilience.reset_timeout = Duration::from_millis(v);
            }
        }
        if let Some(v) = file.validation {
            if let Some(x) = v.min_publications {
                self.validation.min_publications = x;
            }
            if let Some(x) = v.max_retractions {
                self.validation.max_retractions = x;
            }
            if let Some(x) = v.min_recent_publications {
                self.validation.min_recent_publications = x;
            }
            if let Some(x) = v.recent_years {
                self.validation.recent_years = x;
            }
            if let Some(x) = v.check_institutional_conflicts {
                self.validation.check_institutional_conflicts = x;
            }
            if let Some(x) = v.check_co_author_conflicts {
                self.validation.check_co_author_conflicts = x;
            }
            if let Some(x) = v.collaboration_years {
                self.validation.collaboration_years = x;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let cfg = Config {
            pubmed_api_key: Some("secret-key".to_string()),
            mailto: Some("me@example.com".to_string()),
            ..Config::default()
        };
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("me@example.com"));
    }

    #[test]
    fn with_file_overrides_only_present_fields() {
        let file = ConfigFile {
            validation: Some(ValidationConfigFile {
                min_publications: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cfg = Config::default().with_file(file);
        assert_eq!(cfg.validation.min_publications, 2);
        // untouched fields keep their defaults
        assert_eq!(cfg.validation.max_retractions, 0);
        assert_eq!(cfg.max_results_per_database, 100);
    }

    #[test]
    fn merge_overlay_wins_base_preserved_when_absent() {
        let base = ConfigFile {
            api_keys: Some(ApiKeysConfig {
                mailto: Some("base@example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile::default();
        let merged = merge(base, overlay);
        assert_eq!(
            merged.api_keys.unwrap().mailto.unwrap(),
            "base@example.com"
        );
    }

    #[test]
    fn merge_overlay_field_takes_precedence() {
        let base = ConfigFile {
            api_keys: Some(ApiKeysConfig {
                mailto: Some("base@example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            api_keys: Some(ApiKeysConfig {
                mailto: Some("overlay@example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(
            merged.api_keys.unwrap().mailto.unwrap(),
            "overlay@example.com"
        );
    }
}
