//! SMTP client support for direct-to-MX delivery.

pub mod client;

pub use client::{ClientError, Response, ResponseLine, SmtpClient};
