//! The message handed to the delivery engine.

use crate::address::Address;

/// An immutable, fully rendered message.
///
/// The body is taken wholesale as an HTML document; no templating or
/// parsing happens anywhere downstream. The address that appears in the
/// visible `To:` header is the sender's own; actual recipients travel
/// only in the SMTP envelope.
#[derive(Debug, Clone)]
pub struct Message {
    subject: String,
    sender: Address,
    sender_name: String,
    html_body: String,
}

impl Message {
    #[must_use]
    pub const fn new(
        subject: String,
        sender: Address,
        sender_name: String,
        html_body: String,
    ) -> Self {
        Self {
            subject,
            sender,
            sender_name,
            html_body,
        }
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The envelope sender, also used as the visible `To:` recipient.
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.sender
    }

    /// Display name used in the `From:` header.
    #[must_use]
    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    #[must_use]
    pub fn html_body(&self) -> &str {
        &self.html_body
    }
}
