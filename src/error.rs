// Error types for store operations

use thiserror::Error;

/// An error reply from a command, carrying Redis-style text such as
/// `WRONGTYPE ...` or `ERR ...`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

impl CommandError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    pub fn is_wrong_type(&self) -> bool {
        self.0.starts_with("WRONGTYPE")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("ERR Error running script '{name}': {message}")]
    Script { name: String, message: String },

    #[error("NOSCRIPT No matching script: {0}")]
    UnknownScript(String),

    #[error("ERR wrong number of arguments for '{name}': expected at least {expected} keys, got {got}")]
    NotEnoughKeys {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("ERR timeout is negative or not a number")]
    InvalidTimeout,

    #[error("Connection is closed.")]
    ConnectionClosed,

    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl StoreError {
    pub fn is_wrong_type(&self) -> bool {
        matches!(self, StoreError::Command(e) if e.is_wrong_type())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
