//! Error types for agentmesh.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a tool's own failure.
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn other(s: impl Into<String>) -> Self {
        Error::Other(s.into())
    }
}
