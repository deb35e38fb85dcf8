//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// A single line of an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g. 220, 250, 550).
    pub code: u16,
    /// Whether this line terminates a multi-line response.
    pub is_last: bool,
    /// The text following the status code.
    pub message: String,
}

/// A complete (possibly multi-line) SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The complete message with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// `true` for a 2xx code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `true` for a 4xx code.
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// `true` for a 5xx code.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// `true` for any 4xx or 5xx code.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// Parse one `NNN[- ]text` response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line does not match the
    /// SMTP reply format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let (code_str, rest) = line.split_at_checked(3).ok_or_else(|| {
            ClientError::ParseError(format!("response line too short: {line:?}"))
        })?;

        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("invalid status code: {code_str:?}")))?;

        let (is_last, message) = match rest.as_bytes().first() {
            None => (true, ""),
            Some(b' ') => (true, &rest[1..]),
            Some(b'-') => (false, &rest[1..]),
            Some(_) => {
                return Err(ClientError::ParseError(format!(
                    "invalid separator in response line: {line:?}"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: message.to_string(),
        })
    }

    /// Parse a complete response from the front of `buffer`.
    ///
    /// Returns the response and the number of bytes consumed, or `None`
    /// if the buffer does not yet hold a complete response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the buffered data is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let text = std::str::from_utf8(buffer)?;

        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut code = None;
        let mut rest = text;

        loop {
            let Some(end) = rest.find('\n') else {
                // Incomplete line, wait for more data
                return Ok(None);
            };

            let raw = &rest[..end];
            consumed += end + 1;
            rest = &rest[end + 1..];

            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(line)?;
            let code = *code.get_or_insert(parsed.code);
            if parsed.code != code {
                return Err(ClientError::ParseError(format!(
                    "status code mismatch in multi-line response: expected {code}, got {}",
                    parsed.code
                )));
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(Some((Self::new(code, lines), consumed)));
            }
        }
    }
}
