//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur when talking to an SMTP server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("failed to parse SMTP response: {0}")]
    ParseError(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The connection was closed unexpectedly.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
