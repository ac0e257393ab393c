//! Application settings.
//!
//! Values are read from an optional `settings.toml` in the working directory
//! and can be overridden with `ROZLICZENIA__<SECTION>__<KEY>` environment
//! variables, e.g. `ROZLICZENIA__SERVER__PORT=8080`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub database: Database,
    pub bind: Option<String>,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
pub struct Storage {
    /// Directory holding invoice scans. Without it blob deletes are no-ops.
    pub blob_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Security {
    /// Argon2 memory cost in KiB for newly hashed passwords.
    pub argon2_memory_kb: Option<u32>,
    pub argon2_iterations: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Server,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub security: Security,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("ROZLICZENIA").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
