//! Outbound message rendering.

use std::fmt::Write;

use chrono::Utc;
use ulid::Ulid;

use mxblast_common::Message;

/// Render a [`Message`] to its on-the-wire RFC 5322 form.
///
/// The visible `To:` header is set to the sender's own address so that
/// individual recipient addresses never appear in headers; the actual
/// recipients are carried purely in the SMTP envelope. The body is sent
/// as a single-part HTML document.
///
/// `local_hostname` is used as the right-hand side of the generated
/// `Message-ID`.
#[must_use]
pub fn render(message: &Message, local_hostname: &str) -> String {
    let mut out = String::with_capacity(message.html_body().len() + 512);

    // Infallible: writing to a String cannot fail
    let _ = write!(
        &mut out,
        "From: {} <{}>\r\n",
        message.sender_name(),
        message.sender()
    );
    let _ = write!(&mut out, "To: {}\r\n", message.sender());
    let _ = write!(&mut out, "Subject: {}\r\n", message.subject());
    let _ = write!(&mut out, "Date: {}\r\n", Utc::now().to_rfc2822());
    let _ = write!(
        &mut out,
        "Message-ID: <{}@{}>\r\n",
        Ulid::new(),
        local_hostname
    );
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/html; charset=utf-8\r\n");
    out.push_str("\r\n");
    out.push_str(message.html_body());

    out
}
