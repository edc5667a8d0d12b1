use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Top-level server configuration, loaded from folio.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub database: DatabaseSection,
    pub sweep: SweepSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:folio.db?mode=rwc".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct SweepSection {
    /// Seconds between reconciliation sweeps. Deadlines can lag by up to
    /// this long.
    pub period_secs: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self { period_secs: 3600 }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file
    /// doesn't exist. Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("SWEEP_PERIOD_SECS")
            && let Ok(secs) = v.parse()
        {
            self.sweep.period_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.database.url, "sqlite:folio.db?mode=rwc");
        assert_eq!(config.sweep.period_secs, 3600);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ServerConfig = toml::from_str(
            "[sweep]\n\
             period_secs = 60\n",
        )
        .unwrap();
        assert_eq!(config.sweep.period_secs, 60);
        // Unspecified sections fall back to defaults
        assert_eq!(config.database.url, "sqlite:folio.db?mode=rwc");
    }
}
