use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Lifecycle worker settings. The sweep interval and the startup catch-up
/// are configuration, not constants, so deployments can tune how quickly
/// elapsed sessions are demoted.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_catch_up")]
    pub catch_up_on_start: bool,
}

fn default_catch_up() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Environment-specific file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment variables, e.g. KURSO__SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("KURSO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
