//! Incremental frame assembler.
//!
//! Turns an arbitrarily-chunked inbound byte stream into completed, validated
//! [`Frame`]s. A single `BytesMut` buffer accumulates across [`push`] calls;
//! the state machine never blocks on partial input. When the buffer runs dry
//! mid-frame it simply returns and picks up where it left off on the next
//! delivery. One assembler instance serves one connection attempt.
//!
//! [`push`]: FrameAssembler::push
//!
//! # Example
//!
//! ```
//! use stomp_session::protocol::{schema, FrameAssembler, ParserEvent, ProtocolVersion};
//!
//! let mut assembler = FrameAssembler::new(schema::for_version(ProtocolVersion::V1_0));
//! let events = assembler.push(b"CONNECTED\nsession:1234\n\n\0");
//!
//! assert_eq!(events.len(), 1);
//! match &events[0] {
//!     ParserEvent::Frame(frame) => assert_eq!(frame.header("session"), Some("1234")),
//!     ParserEvent::Error(e) => panic!("unexpected: {}", e.message),
//! }
//! ```

use bytes::{Buf, BytesMut};

use super::frame::{Frame, FRAME_TERMINATOR};
use super::schema::VersionSchema;
use crate::error::StompError;

/// Parsing state for the in-progress frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Scanning lines for the next command.
    AwaitingCommand,
    /// Command found, consuming header lines until the blank separator.
    AwaitingHeaders,
    /// Header block done, assembling the body.
    AwaitingBody,
    /// Terminal. A fatal parse error stops all further processing; the
    /// owning session tears down the transport.
    Error,
}

/// A failed attempt to parse or validate an inbound frame.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    /// Human-readable failure description.
    pub message: String,
    /// Diagnostic payload. Absent for the no-validator case, which the
    /// protocol reports message-only.
    pub detail: Option<String>,
}

impl From<ParseFailure> for StompError {
    fn from(failure: ParseFailure) -> Self {
        StompError::Parse {
            message: failure.message,
            detail: failure.detail,
        }
    }
}

/// Output of one [`FrameAssembler::push`] call.
#[derive(Debug)]
pub enum ParserEvent {
    /// A completed, validated frame.
    Frame(Frame),
    /// A parse or validation failure.
    Error(ParseFailure),
}

/// Incremental state machine turning raw bytes into frames.
pub struct FrameAssembler {
    buffer: BytesMut,
    state: State,
    frame: Frame,
    schema: &'static VersionSchema,
}

impl FrameAssembler {
    /// Create an assembler bound to the schema of the negotiated version.
    pub fn new(schema: &'static VersionSchema) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::AwaitingCommand,
            frame: Frame::new(),
            schema,
        }
    }

    /// Feed a chunk of bytes and collect every event it completes.
    ///
    /// A single delivery may yield zero, one, or many frames; frame
    /// boundaries never have to align with chunk boundaries. Once a fatal
    /// parse error has been reported, all further input is ignored.
    pub fn push(&mut self, data: &[u8]) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        if self.state == State::Error {
            return events;
        }

        self.buffer.extend_from_slice(data);

        loop {
            if self.state == State::AwaitingCommand {
                self.parse_command(&mut events);
            }
            if self.state == State::AwaitingHeaders {
                self.parse_headers(&mut events);
            }
            if self.state == State::AwaitingBody {
                self.parse_body(&mut events);
            }
            // A completed frame may be followed by another one already
            // sitting in the buffer.
            if self.state != State::AwaitingCommand || !self.has_line() {
                break;
            }
        }

        events
    }

    /// Whether a fatal parse error has been reported.
    pub fn is_poisoned(&self) -> bool {
        self.state == State::Error
    }

    fn has_line(&self) -> bool {
        self.buffer.iter().any(|&b| b == b'\n')
    }

    /// Pop one line, consuming its terminator. Returns `None` when no
    /// complete line is buffered.
    fn pop_line(&mut self) -> Option<String> {
        let idx = self.buffer.iter().position(|&b| b == b'\n')?;
        let line = self.buffer.split_to(idx);
        self.buffer.advance(1);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn parse_command(&mut self, events: &mut Vec<ParserEvent>) {
        while let Some(line) = self.pop_line() {
            // Blank lines between frames are broker keep-alives.
            if line.is_empty() {
                continue;
            }
            if !self.schema.contains(&line) {
                self.fail(
                    events,
                    "No such command".to_string(),
                    Some(format!("Unrecognized Command '{line}'")),
                );
                return;
            }
            self.frame.set_command(line);
            self.state = State::AwaitingHeaders;
            return;
        }
    }

    fn parse_headers(&mut self, events: &mut Vec<ParserEvent>) {
        while let Some(line) = self.pop_line() {
            if line.is_empty() {
                self.state = State::AwaitingBody;
                return;
            }
            // Split on the first colon only; values may embed colons.
            match line.split_once(':') {
                Some((key, value)) => self.frame.set_header(key, value),
                None => {
                    self.fail(
                        events,
                        "Error parsing header".to_string(),
                        Some(format!("No ':' in line '{line}'")),
                    );
                    return;
                }
            }
        }
    }

    fn parse_body(&mut self, events: &mut Vec<ParserEvent>) {
        if let Some(declared) = self.frame.declared_len() {
            // Binary-safe extraction: consume exactly the declared byte
            // count, never scanning for the terminator.
            let need = declared.saturating_sub(self.frame.body().len());
            let take = need.min(self.buffer.len());
            let chunk = self.buffer.split_to(take);
            self.frame.append_body(&chunk);

            if self.frame.body().len() < declared {
                return;
            }
            self.frame.clear_declared_len();
        }

        match self.buffer.iter().position(|&b| b == FRAME_TERMINATOR) {
            None => {
                // No terminator yet; buffer everything as body and wait.
                let rest = self.buffer.split();
                self.frame.append_body(&rest);
            }
            Some(idx) => {
                let chunk = self.buffer.split_to(idx);
                self.frame.append_body(&chunk);
                self.buffer.advance(1);
                self.complete_frame(events);
            }
        }
    }

    /// Validate and emit the in-progress frame, then reset for the next one.
    fn complete_frame(&mut self, events: &mut Vec<ParserEvent>) {
        let frame = std::mem::take(&mut self.frame);
        self.state = State::AwaitingCommand;

        match self.schema.get(frame.command()) {
            None => {
                // Reported message-only, without frame detail. The command
                // vocabulary check normally catches this earlier; reaching
                // here signals a protocol/version mismatch.
                events.push(ParserEvent::Error(ParseFailure {
                    message: format!("No validator defined for {}", frame.command()),
                    detail: None,
                }));
            }
            Some(entry) => match frame.validate(entry) {
                Ok(()) => events.push(ParserEvent::Frame(frame)),
                Err(failure) => events.push(ParserEvent::Error(ParseFailure {
                    message: failure.message,
                    detail: failure.detail,
                })),
            },
        }
    }

    fn fail(&mut self, events: &mut Vec<ParserEvent>, message: String, detail: Option<String>) {
        self.state = State::Error;
        self.frame = Frame::new();
        events.push(ParserEvent::Error(ParseFailure { message, detail }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::schema::{self, ProtocolVersion};

    fn assembler() -> FrameAssembler {
        FrameAssembler::new(schema::for_version(ProtocolVersion::V1_0))
    }

    fn expect_frame(event: &ParserEvent) -> &Frame {
        match event {
            ParserEvent::Frame(frame) => frame,
            ParserEvent::Error(e) => panic!("expected frame, got error: {}", e.message),
        }
    }

    fn expect_error(event: &ParserEvent) -> &ParseFailure {
        match event {
            ParserEvent::Error(e) => e,
            ParserEvent::Frame(f) => panic!("expected error, got {} frame", f.command()),
        }
    }

    #[test]
    fn test_connected_frame_literal() {
        let mut assembler = assembler();
        let events = assembler.push(b"CONNECTED\nsession:1234\n\n\0");

        assert_eq!(events.len(), 1);
        let frame = expect_frame(&events[0]);
        assert_eq!(frame.command(), "CONNECTED");
        assert_eq!(frame.header("session"), Some("1234"));
        assert!(frame.body().is_empty());
    }

    #[test]
    fn test_chunk_split_invariance() {
        let wire = b"MESSAGE\ndestination:/queue/a\nmessage-id:m-1\ncontent-length:5\n\nhello\0";

        for split in 1..wire.len() {
            let mut assembler = assembler();
            let mut events = Vec::new();
            for chunk in wire.chunks(split) {
                events.extend(assembler.push(chunk));
            }

            assert_eq!(events.len(), 1, "split size {split}");
            let frame = expect_frame(&events[0]);
            assert_eq!(frame.command(), "MESSAGE");
            assert_eq!(frame.header("destination"), Some("/queue/a"));
            assert_eq!(frame.body(), b"hello");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = b"CONNECTED\nsession:abc\n\n\0";
        let mut assembler = assembler();
        let mut events = Vec::new();

        for byte in wire {
            events.extend(assembler.push(&[*byte]));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(expect_frame(&events[0]).header("session"), Some("abc"));
    }

    #[test]
    fn test_multiple_frames_single_push() {
        let mut assembler = assembler();
        let events = assembler.push(
            b"CONNECTED\nsession:1\n\n\0MESSAGE\ndestination:/q\nmessage-id:2\n\nhi\0RECEIPT\n\n\0",
        );

        assert_eq!(events.len(), 3);
        assert_eq!(expect_frame(&events[0]).command(), "CONNECTED");
        let message = expect_frame(&events[1]);
        assert_eq!(message.command(), "MESSAGE");
        assert_eq!(message.body(), b"hi");
        assert_eq!(expect_frame(&events[2]).command(), "RECEIPT");
    }

    #[test]
    fn test_blank_lines_before_command_skipped() {
        let mut assembler = assembler();
        let events = assembler.push(b"\n\n\nCONNECTED\nsession:1\n\n\0");

        assert_eq!(events.len(), 1);
        assert_eq!(expect_frame(&events[0]).command(), "CONNECTED");
    }

    #[test]
    fn test_unknown_command_is_fatal() {
        let mut assembler = assembler();
        let events = assembler.push(b"BOGUS\n");

        assert_eq!(events.len(), 1);
        let failure = expect_error(&events[0]);
        assert_eq!(failure.message, "No such command");
        assert_eq!(failure.detail.as_deref(), Some("Unrecognized Command 'BOGUS'"));

        // terminal: further input is ignored
        assert!(assembler.is_poisoned());
        assert!(assembler.push(b"CONNECTED\nsession:1\n\n\0").is_empty());
    }

    #[test]
    fn test_header_without_colon_is_fatal() {
        let mut assembler = assembler();
        let events = assembler.push(b"CONNECTED\nsession 1234\n");

        assert_eq!(events.len(), 1);
        let failure = expect_error(&events[0]);
        assert_eq!(failure.message, "Error parsing header");
        assert!(failure.detail.as_deref().unwrap().contains("session 1234"));
        assert!(assembler.is_poisoned());
    }

    #[test]
    fn test_header_value_keeps_embedded_colons() {
        let mut assembler = assembler();
        let events = assembler.push(b"MESSAGE\ndestination:/q\nmessage-id:host:port:1\n\n\0");

        let frame = expect_frame(&events[0]);
        assert_eq!(frame.header("message-id"), Some("host:port:1"));
    }

    #[test]
    fn test_content_length_body_may_contain_nul() {
        let mut assembler = assembler();
        let mut wire = Vec::new();
        wire.extend_from_slice(b"MESSAGE\ndestination:/q\nmessage-id:1\ncontent-length:5\n\n");
        wire.extend_from_slice(b"a\0b\0c");
        wire.push(0);

        let events = assembler.push(&wire);
        assert_eq!(events.len(), 1);
        let frame = expect_frame(&events[0]);
        assert_eq!(frame.body(), b"a\0b\0c");
        assert_eq!(frame.declared_len(), None);
    }

    #[test]
    fn test_content_length_split_across_deliveries() {
        let mut assembler = assembler();
        assert!(assembler
            .push(b"MESSAGE\ndestination:/q\nmessage-id:1\ncontent-length:10\n\n01234")
            .is_empty());
        assert!(assembler.push(b"567").is_empty());
        let events = assembler.push(b"89\0");

        assert_eq!(events.len(), 1);
        assert_eq!(expect_frame(&events[0]).body(), b"0123456789");
    }

    #[test]
    fn test_body_without_content_length_scans_for_nul() {
        let mut assembler = assembler();
        assert!(assembler.push(b"ERROR\n\npartial bod").is_empty());
        let events = assembler.push(b"y\0");

        assert_eq!(events.len(), 1);
        assert_eq!(expect_frame(&events[0]).body(), b"partial body");
    }

    #[test]
    fn test_validation_failure_emitted_instead_of_frame() {
        let mut assembler = assembler();
        let events = assembler.push(b"CONNECTED\n\n\0");

        assert_eq!(events.len(), 1);
        let failure = expect_error(&events[0]);
        assert_eq!(failure.message, "Header \"session\" is required for CONNECTED");
        assert!(failure.detail.is_some());

        // validation failures are not terminal for the assembler itself;
        // the session closes the transport
        assert!(!assembler.is_poisoned());
        let events = assembler.push(b"CONNECTED\nsession:1\n\n\0");
        assert_eq!(events.len(), 1);
        expect_frame(&events[0]);
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let mut frame = Frame::with_command("MESSAGE");
        frame.set_header("destination", "/topic/t");
        frame.set_header("message-id", "id-9");
        frame.append_body("corps de message: héllo".as_bytes());

        let wire = frame.serialize();
        let mut assembler = assembler();
        let events = assembler.push(&wire);

        assert_eq!(events.len(), 1);
        let parsed = expect_frame(&events[0]);
        assert_eq!(parsed.command(), "MESSAGE");
        assert_eq!(parsed.header("destination"), Some("/topic/t"));
        assert_eq!(parsed.header("message-id"), Some("id-9"));
        assert_eq!(parsed.body(), frame.body());
    }

    #[test]
    fn test_partial_frame_not_observable() {
        let mut assembler = assembler();
        assert!(assembler.push(b"CONNECTED\nsess").is_empty());
        assert!(assembler.push(b"ion:12").is_empty());
        assert!(assembler.push(b"34\n\n").is_empty());

        let events = assembler.push(b"\0");
        assert_eq!(events.len(), 1);
        assert_eq!(expect_frame(&events[0]).header("session"), Some("1234"));
    }
}
