//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub emulation: EmulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind listeners on
    #[serde(default = "default_host")]
    pub host: String,
    /// Ports to expose; each port gets exactly one protocol handler
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmulationConfig {
    #[serde(default = "default_ftp_banner")]
    pub ftp_banner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ports() -> Vec<u16> {
    vec![80, 21]
}

fn default_ftp_banner() -> String {
    "220 FTP Service Ready".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            ports: default_ports(),
        }
    }
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            ftp_banner: default_ftp_banner(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("DECOYNET"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.server.ports.is_empty() {
            anyhow::bail!("At least one port must be configured");
        }
        let mut seen = HashSet::new();
        for port in &self.server.ports {
            if *port == 0 {
                anyhow::bail!("Invalid port: 0 is not allowed");
            }
            // Each port maps to exactly one handler for the process lifetime
            if !seen.insert(*port) {
                anyhow::bail!("Duplicate port {} in server.ports", port);
            }
        }

        if self.emulation.ftp_banner.is_empty() {
            anyhow::bail!("FTP banner cannot be empty");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }
}
