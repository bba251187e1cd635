use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use domain::connection::{
    DEFAULT_SERVICE_ACTION, DEFAULT_SERVICE_PACKAGE, MAX_RETRY_COUNT, RETRY_INTERVAL,
};
use domain::{PrintFormat, ServiceEndpoint, SupervisorConfig};
use serde::{Deserialize, Serialize};

use crate::platform::SimulatorConfig;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_service_action")]
    pub action: String,
    #[serde(default = "default_service_package")]
    pub package: String,
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_service_action() -> String {
    DEFAULT_SERVICE_ACTION.to_string()
}
fn default_service_package() -> String {
    DEFAULT_SERVICE_PACKAGE.to_string()
}
fn default_max_retry_count() -> u32 {
    MAX_RETRY_COUNT
}
fn default_retry_interval_ms() -> u64 {
    RETRY_INTERVAL.as_millis() as u64
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            action: default_service_action(),
            package: default_service_package(),
            max_retry_count: default_max_retry_count(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            endpoint: ServiceEndpoint {
                action: self.action.clone(),
                package: self.package.clone(),
            },
            max_retry_count: self.max_retry_count,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrinterConfig {
    #[serde(default)]
    pub letter_spacing: f32,
    #[serde(default = "default_true")]
    pub auto_cut_paper: bool,
    #[serde(default = "default_line_feed_pixels")]
    pub line_feed_pixels: u32,
    #[serde(default = "default_true")]
    pub use_epay_module: bool,
}

fn default_true() -> bool {
    true
}
fn default_line_feed_pixels() -> u32 {
    50
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            letter_spacing: 0.0,
            auto_cut_paper: true,
            line_feed_pixels: default_line_feed_pixels(),
            use_epay_module: true,
        }
    }
}

impl PrinterConfig {
    pub fn print_format(&self) -> PrintFormat {
        PrintFormat {
            letter_spacing: self.letter_spacing,
            auto_cut_paper: self.auto_cut_paper,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct BrokerConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl BrokerConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // 3. Local config file, e.g. config/default.toml
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // 2. Run mode overrides, e.g. config/development.toml
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // 1. Environment variables (e.g. PRINTBROKER__SERVICE__MAX_RETRY_COUNT=5)
            .add_source(Environment::with_prefix("PRINTBROKER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
