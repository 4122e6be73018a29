//! Worker configuration.
//!
//! Broker credentials and the config file location come from required
//! environment variables; the set of operators to expose comes from a YAML
//! file with a top-level `operators` list of qualified identifiers. Missing
//! or malformed values abort startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while resolving settings or reading the operator list.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// An environment variable is set but cannot be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidVar {
        /// Variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The operator configuration file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Configured file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The operator configuration file is not a valid operator list.
    #[error("failed to parse config file {path}")]
    Parse {
        /// Configured file path.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Broker and worker settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// AMQP virtual host.
    pub virtual_host: String,
    /// Broker username.
    pub username: String,
    /// Broker password.
    pub password: String,
    /// Path of the YAML file listing the operators to expose.
    pub config_filename: PathBuf,
}

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or `PORT`
    /// is not a valid port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_resolver(|var| std::env::var(var).ok())
    }

    /// Resolve settings using a custom variable resolver.
    ///
    /// Takes a resolver function for testability (avoids mutating the
    /// process environment in tests).
    pub fn from_resolver(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port_raw = require(&env, "PORT")?;
        let port = port_raw.parse().map_err(|_| ConfigError::InvalidVar {
            var: "PORT",
            value: port_raw.clone(),
        })?;

        Ok(Self {
            host: require(&env, "HOST")?,
            port,
            virtual_host: require(&env, "VIRTUAL_HOST")?,
            username: require(&env, "USERNAME")?,
            password: require(&env, "PASSWORD")?,
            config_filename: PathBuf::from(require(&env, "CONFIG_FILENAME")?),
        })
    }
}

fn require(env: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<String, ConfigError> {
    env(var).ok_or(ConfigError::MissingVar(var))
}

// ---------------------------------------------------------------------------
// Operator list
// ---------------------------------------------------------------------------

/// Shape of the operator configuration file.
#[derive(Debug, Deserialize)]
struct OperatorFile {
    operators: Vec<String>,
}

/// Read the ordered list of qualified operator identifiers from `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or is not a YAML
/// document with a top-level `operators` list.
pub fn read_operator_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: OperatorFile =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file.operators)
}
