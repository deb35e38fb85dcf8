//! Per-attempt error taxonomy for delivery operations.
//!
//! Every variant is non-fatal to the batch: a failed attempt against one
//! mail exchanger triggers fallback to the next one in preference order.
//! Batch-level failure only arises once the whole set is exhausted.

use thiserror::Error;

use mxblast_smtp::ClientError;

/// A failed delivery attempt against a single mail exchanger.
#[derive(Debug, Error)]
pub enum HostError {
    /// The server rejected the session greeting (220 banner, EHLO and HELO).
    #[error("{host} rejected greeting: {response}")]
    Greeting { host: String, response: String },

    /// Connection, protocol, or I/O error while talking to the server.
    #[error("transport failure with {host}: {source}")]
    Transport {
        host: String,
        #[source]
        source: ClientError,
    },

    /// The server rejected a protocol step with an SMTP error code.
    #[error("{host} rejected {command}: {response}")]
    Rejected {
        host: String,
        command: &'static str,
        response: String,
    },

    /// An operation exceeded its configured timeout.
    #[error("{operation} with {host} timed out after {seconds}s")]
    Timeout {
        host: String,
        operation: &'static str,
        seconds: u64,
    },

    /// TLS is required for this domain but could not be negotiated.
    #[error("TLS required but unavailable on {host}: {detail}")]
    TlsRequired { host: String, detail: String },
}
