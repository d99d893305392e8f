//! Configuration System
//!
//! Settings for the ambient layers around the generator runtime. Sources are
//! merged in order, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `NESTGEN__*` environment variables (`NESTGEN__LOGGING__LEVEL=trace`)

use crate::error::SetupError;
use crate::logging::{LoggingConfig, FORMATS, LEVELS, OUTPUTS};
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root settings structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Create a Config builder with defaults applied.
fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, SetupError> {
    let defaults = LoggingConfig::default();
    Ok(Config::builder()
        .set_default("logging.level", defaults.level)?
        .set_default("logging.format", defaults.format)?
        .set_default("logging.output", defaults.output)?
        .set_default("logging.color", defaults.color)?)
}

impl Settings {
    /// Load settings from defaults, `file` if it exists, and the environment
    pub fn load(file: Option<&Path>) -> Result<Self, SetupError> {
        let mut builder = builder_with_defaults()?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("NESTGEN")
                .prefix_separator("__")
                .separator("__"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every value against the set the logging layer understands
    pub fn validate(&self) -> Result<(), SetupError> {
        let logging = &self.logging;
        check("logging.level", &logging.level, &LEVELS)?;
        check("logging.format", &logging.format, &FORMATS)?;
        check("logging.output", &logging.output, &OUTPUTS)?;
        for (module, level) in &logging.modules {
            check(&format!("logging.modules.{}", module), level, &LEVELS)?;
        }
        Ok(())
    }
}

fn check(key: &str, value: &str, allowed: &[&str]) -> Result<(), SetupError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(SetupError::InvalidSetting {
        key: key.to_string(),
        message: format!("'{}' is not one of {}", value, allowed.join(", ")),
    })
}
