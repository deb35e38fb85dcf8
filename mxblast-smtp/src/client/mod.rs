//! SMTP client used by the delivery engine.
//!
//! Supports plain TCP connections with an opportunistic STARTTLS upgrade,
//! multi-line response parsing, and rendering of the outbound message.

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::render;
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
