//! Layered server configuration.
//!
//! Sources, lowest precedence first:
//! 1) built-in defaults
//! 2) YAML file passed with `--config`
//! 3) environment variables `APP__SECTION__KEY`
//! 4) CLI flags (`-v`)

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use ledger::ServiceConfig;
use serde::{Deserialize, Serialize};
use tenantkit_db::{DatabaseConfig, redact_dsn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub ledger: ServiceConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ledger=debug,sqlx=warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Re-check tenant policies at this interval while serving; stop if one is found inactive.
    #[serde(with = "humantime_serde")]
    pub policy_check_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            policy_check_interval: Some(Duration::from_secs(300)),
        }
    }
}

impl AppConfig {
    /// Build the effective configuration.
    ///
    /// # Errors
    /// Fails if the given file does not exist, is not valid YAML or holds unknown keys.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("APP__").split("__"))
            .extract()
            .context("invalid configuration")
    }

    /// Raise the log level for `-v` (info), `-vv` (debug) and `-vvv` (trace).
    pub fn apply_verbosity(&mut self, verbose: u8) {
        let level = match verbose {
            0 => return,
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        level.clone_into(&mut self.logging.level);
    }

    /// YAML rendering with the database password masked.
    ///
    /// # Errors
    /// Fails if serialization fails.
    pub fn to_redacted_yaml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.database.dsn = redact_dsn(&shown.database.dsn);
        serde_saphyr::to_string(&shown).context("failed to render configuration")
    }
}
