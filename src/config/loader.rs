//! Configuration Loader
//!
//! Environment-aware layered loading with the `config` crate. Later layers win:
//!
//! 1. compiled defaults
//! 2. `{dir}/storyforge.toml` (optional)
//! 3. `{dir}/storyforge.{environment}.toml` (optional)
//! 4. `STORYFORGE_*` environment variables, `__` separating nested keys
//!    (`STORYFORGE_ORCHESTRATION__MAX_CONCURRENT_TASKS=8`)

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::ConfigResult;
use super::StoryforgeConfig;

const ENV_PREFIX: &str = "STORYFORGE";
const ENVIRONMENT_VARIABLE: &str = "STORYFORGE_ENV";
const BASE_FILE_NAME: &str = "storyforge";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: StoryforgeConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without touching `STORYFORGE_ENV`.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        debug!(
            config = %serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string()),
            "Configuration resolved"
        );
        info!(
            environment = %environment,
            workers = config.orchestration.max_concurrent_tasks,
            storyboard_backend = %config.providers.storyboard.backend,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: StoryforgeConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<StoryforgeConfig> {
        let base = config_directory.join(format!("{BASE_FILE_NAME}.toml"));
        let overlay = config_directory.join(format!("{BASE_FILE_NAME}.{environment}.toml"));

        let config = Config::builder()
            .add_source(Config::try_from(&StoryforgeConfig::default())?)
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &StoryforgeConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Configuration as JSON with API keys masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect current environment: STORYFORGE_ENV or "development"
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VARIABLE)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn sanitize_config_for_logging(config: &StoryforgeConfig) -> serde_json::Value {
        let mut config_json = serde_json::to_value(config).unwrap_or_default();
        Self::sanitize_json_recursive(&mut config_json, &["key", "secret", "token", "password"]);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        if let serde_json::Value::String(s) = val {
                            let masked = if s.len() > 4 {
                                format!("[MASKED: {}***{}]", &s[..2], &s[s.len() - 2..])
                            } else {
                                "[MASKED]".to_string()
                            };
                            *val = serde_json::Value::String(masked);
                        }
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
