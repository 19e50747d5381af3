//! Application configuration
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. Environment variables: `DMS__SECTION__KEY` (e.g. `DMS__SERVER__PORT=9090`)

use anyhow::Context;
use camera_capture::CameraConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use session::SessionConfig;

pub const ENV_PREFIX: &str = "DMS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to read configuration")?;
        let app_config: AppConfig = config
            .try_deserialize()
            .context("invalid configuration")?;

        app_config
            .session
            .validate()
            .context("invalid session configuration")?;
        Ok(app_config)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("failed to parse configuration")?;
        let app_config: AppConfig = config.try_deserialize().context("invalid configuration")?;
        app_config
            .session
            .validate()
            .context("invalid session configuration")?;
        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertness::SignalSource;
    use analyzer_link::FrameFormat;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.sampler.interval_ms, 100);
        assert_eq!(config.session.alertness.grace_period_ms, 5000);
        assert_eq!(config.session.link.connect_timeout_ms, 3000);
        assert_eq!(config.session.timing.tick_interval_ms, 1000);
    }

    #[test]
    fn test_from_toml_overrides_sections() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 9090

            [logging]
            json = true

            [session.link]
            endpoint = "ws://analyzer.local:8000/ws"
            frame_format = "json"

            [session.alertness]
            critical_signal_count = 5

            [session.signal_source]
            type = "synthetic_generator"
            eyes_closed_probability = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert!(config.logging.json);
        assert_eq!(config.session.link.endpoint, "ws://analyzer.local:8000/ws");
        assert_eq!(config.session.link.frame_format, FrameFormat::Json);
        assert_eq!(config.session.alertness.critical_signal_count, 5);
        assert_eq!(config.session.alertness.hold_period_ms, 3000);
        match config.session.signal_source {
            SignalSource::SyntheticGenerator(synthetic) => {
                assert_eq!(synthetic.eyes_closed_probability, 0.25);
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_session_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [session.alertness]
            critical_signal_count = 0
            "#,
        );
        assert!(result.is_err());
    }
}
