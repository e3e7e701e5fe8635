//! Core error types for hostlink

use std::path::PathBuf;
use thiserror::Error;

/// Errors affecting the physical connection to the broker.
///
/// Any of these ends every session carried by the connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Broker address could not be turned into a dialable URL
    #[error("Invalid broker URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connecting did not finish in time
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// WebSocket handshake or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// No pong arrived within the configured maximum wait
    #[error("Keepalive timeout: no pong for {0:?}")]
    KeepaliveTimeout(std::time::Duration),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Two handlers registered for the same exact path
    #[error("Duplicate handler route: {0}")]
    DuplicateRoute(String),

    /// Initial message could not be parsed
    #[error("Invalid initial message {message:?}: {reason}")]
    InvalidInitialMessage { message: String, reason: String },
}

/// Token validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No token presented
    #[error("Missing token")]
    MissingToken,

    /// Token presented but rejected
    #[error("Invalid token")]
    InvalidToken,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
