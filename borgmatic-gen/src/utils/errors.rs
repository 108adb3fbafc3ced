//! Custom error types for the config generator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenError {
    #[error("{0}")]
    Usage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Malformed override document: {0}")]
    MalformedOverride(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Could not lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl GenError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GenError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
