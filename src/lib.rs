//! # stomp-session
//!
//! Async client for the STOMP 1.0/1.1 text messaging protocol over plain TCP
//! or TLS.
//!
//! ## Architecture
//!
//! - **Protocol engine** ([`protocol`]): frames, per-version validation
//!   schemas, and the incremental assembler that turns an arbitrarily-chunked
//!   byte stream into completed frames.
//! - **Session task** (internal): owns the transport, drives the
//!   CONNECT/CONNECTED handshake, dispatches inbound `MESSAGE` frames to
//!   subscription listeners, and reconnects with linear backoff. All protocol
//!   state lives on this one task.
//! - **Client handle** ([`StompClient`]): publish, subscribe, and disconnect
//!   over a command channel.
//!
//! ## Example
//!
//! ```ignore
//! use stomp_session::{SessionConfig, StompClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder()
//!         .address("broker.example.net")
//!         .credentials("guest", "guest")
//!         .build()?;
//!
//!     let client = StompClient::builder(config)
//!         .on_connect(|session| println!("session {session}"))
//!         .connect();
//!
//!     client.publish("/queue/demo", "hello").await?;
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod session;
mod writer;

pub use client::{ClientBuilder, StompClient};
pub use config::{ReconnectPolicy, SessionConfig, SessionConfigBuilder, TlsOptions};
pub use error::{Result, StompError};
pub use protocol::{Frame, HeaderMap, ProtocolVersion};
pub use session::MessageListener;
