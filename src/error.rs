//! Error types for the navigation core

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum VyuhaError {
    #[error("Map storage error: {0}")]
    Storage(String),

    #[error("Map self-test failed: {0}")]
    SelfTest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Solver error: {0}")]
    Solver(#[from] crate::solver::SolveError),
}

impl From<std::io::Error> for VyuhaError {
    fn from(e: std::io::Error) -> Self {
        VyuhaError::Storage(e.to_string())
    }
}

impl From<toml::de::Error> for VyuhaError {
    fn from(e: toml::de::Error) -> Self {
        VyuhaError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VyuhaError>;
