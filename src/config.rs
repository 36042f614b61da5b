use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration structure for Flowdeck.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowdeckConfig {
    /// Document store connection settings
    pub store: StoreConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// MongoDB connection string
    pub uri: String,
    /// Database holding the workflow collection
    pub database: String,
    /// Application name reported to the server
    pub app_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl FlowdeckConfig {
    /// Loads `flowdeck.toml` (if present) with a `FLOWDECK_`-prefixed
    /// environment overlay, e.g. `FLOWDECK_STORE__URI`.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("store.uri", "mongodb://localhost:27017")?
            .set_default("store.database", "flowdeck")?
            .set_default("store.app_name", "flowdeck")?
            .set_default("observability.log_level", "info")?
            .set_default("observability.json_logs", false)?
            .add_source(File::with_name("flowdeck").required(false))
            .add_source(Environment::with_prefix("FLOWDECK").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let config = FlowdeckConfig::load().expect("defaults must load");
        assert_eq!(config.store.database, "flowdeck");
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.json_logs);
    }
}
