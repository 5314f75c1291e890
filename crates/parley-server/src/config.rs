use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub calls: CallConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            server_name: default_server_name(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/parley.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CallConfig {
    /// Seconds an unanswered call rings before automatic teardown.
    #[serde(default = "default_ring_timeout_seconds")]
    pub ring_timeout_seconds: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_seconds: default_ring_timeout_seconds(),
        }
    }
}

fn default_server_name() -> String {
    "Parley Server".into()
}

fn default_max_connections() -> u32 {
    10
}

fn default_ring_timeout_seconds() -> u64 {
    30
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', using defaults", path);
            Config::default()
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("PARLEY_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("PARLEY_SERVER_NAME") {
            config.server.server_name = value;
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse() {
                config.database.max_connections = parsed;
            }
        }
        if let Ok(value) = std::env::var("PARLEY_CALL_RING_TIMEOUT_SECONDS") {
            if let Ok(parsed) = value.parse() {
                config.calls.ring_timeout_seconds = parsed;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/parley.toml").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.calls.ring_timeout_seconds, 30);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind_address = \"127.0.0.1:9000\"\n\n[database]\nurl = \"sqlite::memory:\""
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.server.server_name, "Parley Server");
    }
}
