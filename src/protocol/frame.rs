//! Frame struct and wire serialization.
//!
//! A [`Frame`] is one discrete STOMP message: a command, an ordered header
//! map, and a byte body. Headers serialize in insertion order with duplicate
//! keys resolved last-write-wins, so the map is an `IndexMap`.
//!
//! # Example
//!
//! ```
//! use stomp_session::protocol::Frame;
//!
//! let mut frame = Frame::with_command("SEND");
//! frame.set_header("destination", "/queue/a");
//! frame.append_body(b"hello");
//!
//! let wire = frame.serialize();
//! assert_eq!(&wire[..], b"SEND\ndestination:/queue/a\ncontent-length:5\n\nhello\0");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

use super::schema::CommandSchema;

/// Ordered string header map, keys case-sensitive, last write wins.
pub type HeaderMap = IndexMap<String, String>;

/// Frame terminator byte.
pub const FRAME_TERMINATOR: u8 = 0;

/// Header that suppresses the automatic `content-length` on serialization.
pub const SUPPRESS_CONTENT_LENGTH: &str = "suppress-content-length";

/// A single STOMP protocol frame.
///
/// Fully constructed before it is ever observable outside the parser; once
/// routed to a subscriber it is treated as immutable.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    command: String,
    headers: HeaderMap,
    body: BytesMut,
    /// Active `content-length` value while the body is being assembled.
    /// Cleared once the declared byte count has been consumed.
    declared_len: Option<usize>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame with a command and no headers or body.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Create a frame from command, headers, and body.
    pub fn from_parts(command: impl Into<String>, headers: HeaderMap, body: &[u8]) -> Self {
        Self {
            command: command.into(),
            headers,
            body: BytesMut::from(body),
            declared_len: None,
        }
    }

    /// Get the frame command.
    #[inline]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Set the frame command.
    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }

    /// Get the header map.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Look up a single header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Set a header.
    ///
    /// A key that case-insensitively equals `content-length` also arms the
    /// declared body length used during body assembly.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if key.eq_ignore_ascii_case("content-length") {
            self.declared_len = value.trim().parse().ok();
        }
        self.headers.insert(key, value);
    }

    /// Get the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body as `Bytes` (copies out of the assembly buffer).
    pub fn body_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    /// Append bytes to the body.
    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// Remaining declared body length, if a `content-length` header is
    /// currently being honored.
    #[inline]
    pub fn declared_len(&self) -> Option<usize> {
        self.declared_len
    }

    /// Clear the declared body length once the body is complete.
    pub fn clear_declared_len(&mut self) {
        self.declared_len = None;
    }

    /// Serialize to canonical wire form.
    ///
    /// `COMMAND\n`, each header as `key:value\n` in insertion order, an
    /// automatic `content-length` for non-empty bodies (unless suppressed via
    /// [`SUPPRESS_CONTENT_LENGTH`]), a blank line, the body, and a single NUL
    /// terminator.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.command.len() + self.body.len() + 64);

        buf.put_slice(self.command.as_bytes());
        buf.put_u8(b'\n');

        for (key, value) in &self.headers {
            buf.put_slice(key.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(value.as_bytes());
            buf.put_u8(b'\n');
        }

        if !self.body.is_empty() && !self.headers.contains_key(SUPPRESS_CONTENT_LENGTH) {
            buf.put_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }

        buf.put_u8(b'\n');
        if !self.body.is_empty() {
            buf.put_slice(&self.body);
        }
        buf.put_u8(FRAME_TERMINATOR);

        buf.freeze()
    }

    /// Validate against the schema entry for this frame's command.
    ///
    /// Returns the first violation: a required header that is absent, or a
    /// present header whose value fails its pattern constraint.
    pub fn validate(&self, schema: &CommandSchema) -> std::result::Result<(), ValidationFailure> {
        for (name, rule) in schema.rules() {
            match self.headers.get(*name) {
                None if rule.required => {
                    return Err(ValidationFailure {
                        message: format!(
                            "Header \"{}\" is required for {}",
                            name, self.command
                        ),
                        detail: Some(self.diagnostic()),
                    });
                }
                Some(value) => {
                    if let Some(pattern) = &rule.pattern {
                        if !pattern.is_match(value) {
                            return Err(ValidationFailure {
                                message: format!(
                                    "Header \"{}\" has value \"{}\" which does not match against the following regex: {}",
                                    name, value, pattern
                                ),
                                detail: Some(self.diagnostic()),
                            });
                        }
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Render the frame for error diagnostics.
    pub fn diagnostic(&self) -> String {
        format!(
            "Frame: command={:?}, headers={:?}, body={:?}",
            self.command,
            self.headers,
            String::from_utf8_lossy(&self.body),
        )
    }
}

/// A failed header constraint check.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// Human-readable message naming the header and command.
    pub message: String,
    /// Diagnostic rendering of the offending frame.
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::schema::{self, ProtocolVersion};

    #[test]
    fn test_serialize_basic() {
        let mut frame = Frame::with_command("CONNECT");
        frame.set_header("login", "user");
        frame.set_header("passcode", "pass");

        let wire = frame.serialize();
        assert_eq!(&wire[..], b"CONNECT\nlogin:user\npasscode:pass\n\n\0");
    }

    #[test]
    fn test_serialize_adds_content_length_for_body() {
        let mut frame = Frame::with_command("SEND");
        frame.set_header("destination", "/queue/x");
        frame.append_body(b"hello");

        let wire = frame.serialize();
        assert_eq!(
            &wire[..],
            b"SEND\ndestination:/queue/x\ncontent-length:5\n\nhello\0"
        );
    }

    #[test]
    fn test_serialize_suppressed_content_length() {
        let mut frame = Frame::with_command("SEND");
        frame.set_header("destination", "/queue/x");
        frame.set_header(SUPPRESS_CONTENT_LENGTH, "true");
        frame.append_body(b"hello");

        let wire = frame.serialize();
        assert!(!wire.windows(14).any(|w| w == b"content-length"));
        assert!(wire.ends_with(b"\n\nhello\0"));
    }

    #[test]
    fn test_serialize_empty_body_has_no_content_length() {
        let frame = Frame::with_command("DISCONNECT");
        assert_eq!(&frame.serialize()[..], b"DISCONNECT\n\n\0");
    }

    #[test]
    fn test_content_length_counts_bytes_not_chars() {
        let mut frame = Frame::with_command("SEND");
        frame.set_header("destination", "/queue/x");
        frame.append_body("héllo".as_bytes()); // 6 bytes, 5 chars

        let wire = frame.serialize();
        let text = String::from_utf8_lossy(&wire);
        assert!(text.contains("content-length:6\n"));
    }

    #[test]
    fn test_headers_preserve_insertion_order() {
        let mut frame = Frame::with_command("SEND");
        frame.set_header("b", "2");
        frame.set_header("a", "1");
        frame.set_header("c", "3");

        let keys: Vec<&str> = frame.headers().keys().map(String::as_str).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_header_last_write_wins() {
        let mut frame = Frame::with_command("SEND");
        frame.set_header("destination", "old");
        frame.set_header("destination", "new");

        assert_eq!(frame.header("destination"), Some("new"));
        assert_eq!(frame.headers().len(), 1);
    }

    #[test]
    fn test_set_header_arms_declared_len() {
        let mut frame = Frame::new();
        assert_eq!(frame.declared_len(), None);

        frame.set_header("Content-Length", "42");
        assert_eq!(frame.declared_len(), Some(42));

        frame.clear_declared_len();
        assert_eq!(frame.declared_len(), None);
        // the header itself stays
        assert_eq!(frame.header("Content-Length"), Some("42"));
    }

    #[test]
    fn test_set_header_unparsable_length_ignored() {
        let mut frame = Frame::new();
        frame.set_header("content-length", "not a number");
        assert_eq!(frame.declared_len(), None);
    }

    #[test]
    fn test_validate_required_header_missing() {
        let schema = schema::for_version(ProtocolVersion::V1_0);
        let entry = schema.get("CONNECTED").unwrap();

        let frame = Frame::with_command("CONNECTED");
        let failure = frame.validate(entry).unwrap_err();

        assert_eq!(failure.message, "Header \"session\" is required for CONNECTED");
        assert!(failure.detail.unwrap().contains("CONNECTED"));
    }

    #[test]
    fn test_validate_required_header_present() {
        let schema = schema::for_version(ProtocolVersion::V1_0);
        let entry = schema.get("CONNECTED").unwrap();

        let mut frame = Frame::with_command("CONNECTED");
        frame.set_header("session", "1234");
        assert!(frame.validate(entry).is_ok());
    }

    #[test]
    fn test_validate_no_required_headers() {
        let schema = schema::for_version(ProtocolVersion::V1_1);
        let entry = schema.get("ERROR").unwrap();

        let frame = Frame::with_command("ERROR");
        assert!(frame.validate(entry).is_ok());
    }
}
