use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Base URL of the storage/projects service the proxy forwards to.
    pub backend_url: String,
    pub web_port: u16,
    pub log_level: String,
    pub static_directory: String,
    pub page_size: usize,
    pub refresh_interval_secs: u64,
    pub expiry_safety_margin_secs: u64,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn load(directory: &str, run_mode: &str) -> Result<Self, ConfigError> {
        let s = Self::defaults()?
            .add_source(File::with_name(&format!("{}/default", directory)).required(false))
            .add_source(File::with_name(&format!("{}/{}", directory, run_mode)).required(false))
            .add_source(File::with_name(&format!("{}/local", directory)).required(false))
            .add_source(Environment::with_prefix("CLUSTERIZE"))
            .build()?;

        s.try_deserialize()
    }

    fn defaults() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("backend_url", "http://localhost:5000")?
            .set_default("web_port", 3000)?
            .set_default("log_level", "info")?
            .set_default("static_directory", "./static")?
            .set_default("page_size", 30)?
            .set_default("refresh_interval_secs", 15)?
            .set_default("expiry_safety_margin_secs", 30)?
            .set_default("request_timeout_secs", 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_files() {
        let config = AppConfig::load("does/not/exist", "test").unwrap();
        assert_eq!(config.page_size, 30);
        assert_eq!(config.refresh_interval_secs, 15);
        assert_eq!(config.expiry_safety_margin_secs, 30);
        assert_eq!(config.web_port, 3000);
    }
}
