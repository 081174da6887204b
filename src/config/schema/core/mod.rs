mod env_overrides;
mod loader;
#[cfg(test)]
pub(super) mod test_env;

use super::{
    AlarmsConfig, EngineConfig, HeaderConfig, LogConfig, RulesConfig, ServerConfig, StorageConfig,
};
use crate::coordinator::CoordinatorOptions;
use crate::engine::HeaderProfile;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest usable rule ceiling: wildcard plus the app domain plus one page.
const MIN_MAX_RULES: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory - computed from home or `OPENPIMS_HOME`, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub header: HeaderConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub alarms: AlarmsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.state_file)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.data_dir.join(&self.engine.rules_file)
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            header: HeaderProfile::new(
                self.header.base_user_agent.clone(),
                self.header.product_token.clone(),
            ),
            max_rules: self.rules.max_rules,
            enforce_cap: self.rules.enforce_cap,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.max_rules < MIN_MAX_RULES {
            return Err(ConfigError::Validation(format!(
                "rules.max_rules must be at least {MIN_MAX_RULES}, got {}",
                self.rules.max_rules
            )));
        }
        if self.header.product_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "header.product_token must not be empty".into(),
            ));
        }
        if self.alarms.check_interval_minutes == 0 {
            return Err(ConfigError::Validation(
                "alarms.check_interval_minutes must be positive".into(),
            ));
        }
        if self.server.default_app_domain.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.default_app_domain must not be empty".into(),
            ));
        }
        if !crate::api::validate_server_url(&self.server.default_server_url) {
            return Err(ConfigError::Validation(format!(
                "server.default_server_url is not an http(s) url: {}",
                self.server.default_server_url
            )));
        }
        if self.log.tracing_level().is_none() {
            return Err(ConfigError::Validation(format!(
                "log.level is not a tracing level: {}",
                self.log.level
            )));
        }
        Ok(())
    }
}
