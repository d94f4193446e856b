//! ---
//! aso_section: "01-core-functionality"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Shared primitives and utilities for the observatory runtime."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_generator_enabled() -> bool {
    true
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_history_capacity() -> usize {
    200
}

fn default_backfill() -> usize {
    20
}

fn default_view_window() -> usize {
    50
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

fn default_true() -> bool {
    true
}

/// Primary configuration object for the observatory runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "ASO_CONFIG";

    /// Load configuration from disk, respecting the `ASO_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants between sections.
    pub fn validate(&self) -> Result<()> {
        if self.generator.interval.is_zero() {
            return Err(anyhow!("generator interval_ms must be greater than zero"));
        }
        if self.bus.backfill == 0 {
            return Err(anyhow!("bus backfill must be at least 1"));
        }
        if self.bus.history_capacity < self.bus.backfill {
            return Err(anyhow!(
                "bus history_capacity ({}) must not be smaller than backfill ({})",
                self.bus.history_capacity,
                self.bus.backfill
            ));
        }
        if self.view.window == 0 {
            return Err(anyhow!("view window must be at least 1"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Cadence and seeding of the autonomous sample generator.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_enabled")]
    pub enabled: bool,
    #[serde(rename = "interval_ms", default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    /// Fixed seed for reproducible runs. Entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_generator_enabled(),
            interval: default_tick_interval(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_backfill")]
    pub backfill: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            backfill: default_backfill(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_view_window")]
    pub window: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            window: default_view_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

/// Hardware button bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Map `LONG_PRESS` events onto an emergency stop.
    #[serde(default = "default_true")]
    pub long_press_estop: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            long_press_estop: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().expect("defaults parse");
        assert!(config.generator.enabled);
        assert_eq!(config.generator.interval, Duration::from_millis(2000));
        assert_eq!(config.bus.history_capacity, 200);
        assert_eq!(config.bus.backfill, 20);
        assert_eq!(config.view.window, 50);
        assert!(!config.metrics.enabled);
        assert!(config.bridge.long_press_estop);
    }

    #[test]
    fn parses_overrides() {
        let config: AppConfig = r#"
            [generator]
            interval_ms = 250
            seed = 7

            [bus]
            history_capacity = 64
            backfill = 10

            [logging]
            format = "pretty"
        "#
        .parse()
        .expect("config parses");
        assert_eq!(config.generator.interval, Duration::from_millis(250));
        assert_eq!(config.generator.seed, Some(7));
        assert_eq!(config.bus.history_capacity, 64);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_history_smaller_than_backfill() {
        let err = r#"
            [bus]
            history_capacity = 5
            backfill = 20
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("history_capacity"));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = "[generator]\ninterval_ms = 0\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn load_picks_first_existing_candidate() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[view]\nwindow = 12")?;
        file.flush()?;
        let missing = PathBuf::from("does/not/exist.toml");
        let loaded = AppConfig::load_with_source(&[missing, file.path().to_path_buf()])?;
        assert_eq!(loaded.config.view.window, 12);
        assert_eq!(loaded.source, file.path());
        Ok(())
    }

    #[test]
    fn load_reports_inspected_paths() {
        let err = AppConfig::load(&["nowhere/a.toml", "nowhere/b.toml"]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nowhere/a.toml"));
        assert!(message.contains("nowhere/b.toml"));
    }
}
