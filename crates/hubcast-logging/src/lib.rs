//! # hubcast-logging
//!
//! Installs the process-wide `tracing` subscriber: an `EnvFilter` built from
//! the configured level and per-module overrides, feeding a single fmt layer
//! that writes either JSON lines or human-readable output to stdout.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("a global subscriber is already installed")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Configuration for the logging subsystem.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub level: Level,
    /// Per-module level overrides (e.g. `hubcast_server` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Build from textual levels as they appear in the settings file.
    pub fn from_names<'a, I>(level: &str, module_levels: I, json: bool) -> Result<Self, LoggingError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let level = parse_level(level)?;
        let module_levels = module_levels
            .into_iter()
            .map(|(module, lvl)| parse_level(lvl).map(|l| (module.clone(), l)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            level,
            module_levels,
            json,
        })
    }

    /// `EnvFilter` directive string, e.g. `info,hubcast_server=debug`.
    pub fn directives(&self) -> String {
        let mut out = self.level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            out.push(',');
            out.push_str(module);
            out.push('=');
            out.push_str(&level.to_string().to_lowercase());
        }
        out
    }
}

pub fn parse_level(name: &str) -> Result<Level, LoggingError> {
    Level::from_str(name.trim()).map_err(|_| LoggingError::InvalidLevel(name.to_string()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}
