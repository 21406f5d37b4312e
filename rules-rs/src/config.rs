use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub domain: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
}

/// Rule processing behavior toggles.
///
/// The two extension bits of the rule state bitmask (0x00000080 and
/// 0x00000100) have vendor-specific semantics, so both interpretations are
/// explicit capabilities here instead of hardcoded behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    /// Honor the 0x00000080 bit as "disable this Out-of-Office rule".
    pub honor_disable_oof_bit: bool,
    /// Treat the 0x00000100 bit as an alias of the only-when-OOF bit.
    pub alias_only_when_oof: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::RuleError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| crate::error::RuleError::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                domain: "localhost".to_string(),
                hostname: "mail.localhost".to_string(),
            },
            storage: StorageConfig {
                database_url: "sqlite://rules.db".to_string(),
            },
            processing: ProcessingConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            honor_disable_oof_bit: true,
            alias_only_when_oof: true,
        }
    }
}
