//! STOMP protocol engine: frames, validation schemas, and the incremental
//! stream assembler.

mod frame;
mod parser;
pub mod schema;

pub use frame::{Frame, HeaderMap, ValidationFailure, FRAME_TERMINATOR, SUPPRESS_CONTENT_LENGTH};
pub use parser::{FrameAssembler, ParseFailure, ParserEvent};
pub use schema::{ProtocolVersion, VersionSchema};
