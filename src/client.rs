//! Client handle and builder.
//!
//! [`ClientBuilder`] collects event handlers and configuration, then
//! `connect()` spawns the session task. The returned [`StompClient`] is the
//! caller's handle: publish, subscribe, and disconnect all travel over a
//! command channel to the session's serialized processing path.
//!
//! # Example
//!
//! ```ignore
//! use stomp_session::{SessionConfig, StompClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder()
//!         .address("127.0.0.1")
//!         .credentials("guest", "guest")
//!         .build()?;
//!
//!     let client = StompClient::builder(config)
//!         .on_connect(|session| println!("connected: {session}"))
//!         .on_error(|err| eprintln!("error: {err}"))
//!         .connect();
//!
//!     client
//!         .subscribe("/queue/work", |body, _headers| {
//!             println!("got {}", String::from_utf8_lossy(body));
//!         })
//!         .await?;
//!
//!     client.publish("/queue/work", "hello").await?;
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{Result, StompError};
use crate::protocol::HeaderMap;
use crate::session::{Command, EventHandlers, MessageListener, Session};

/// Capacity of the handle-to-session command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Builder collecting configuration and event handlers.
pub struct ClientBuilder {
    config: SessionConfig,
    handlers: EventHandlers,
}

impl ClientBuilder {
    /// Create a builder from a normalized configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            handlers: EventHandlers::default(),
        }
    }

    /// Handler for the initial `CONNECTED` exchange; receives the broker
    /// session id.
    pub fn on_connect(mut self, handler: impl Fn(&str) + Send + 'static) -> Self {
        self.handlers.on_connect.push(Box::new(handler));
        self
    }

    /// Handler fired when `CONNECTED` arrives after a reconnect.
    pub fn on_reconnect(mut self, handler: impl Fn(&str) + Send + 'static) -> Self {
        self.handlers.on_reconnect.push(Box::new(handler));
        self
    }

    /// Handler fired once when an outage begins and retries are about to
    /// start.
    pub fn on_reconnecting(mut self, handler: impl Fn() + Send + 'static) -> Self {
        self.handlers.on_reconnecting.push(Box::new(handler));
        self
    }

    /// Handler for every inbound `MESSAGE`, regardless of subscription.
    pub fn on_message(mut self, handler: impl Fn(&[u8], &HeaderMap) + Send + 'static) -> Self {
        self.handlers.on_message.push(Box::new(handler));
        self
    }

    /// Handler for session errors: parse failures, broker `ERROR` frames,
    /// and exhausted reconnect budgets.
    pub fn on_error(mut self, handler: impl Fn(&StompError) + Send + 'static) -> Self {
        self.handlers.on_error.push(Box::new(handler));
        self
    }

    /// Spawn the session task and return the client handle.
    ///
    /// Connection establishment, the handshake, and any reconnection all
    /// happen on the session task; failures surface through the error
    /// handler.
    pub fn connect(self) -> StompClient {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let session = Session::new(self.config, self.handlers, rx);
        let task = tokio::spawn(session.run());
        StompClient { tx, _task: task }
    }
}

/// Handle to a running STOMP session.
pub struct StompClient {
    tx: mpsc::Sender<Command>,
    _task: JoinHandle<()>,
}

impl StompClient {
    /// Create a builder from a normalized configuration.
    pub fn builder(config: SessionConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Publish a message to a destination.
    ///
    /// Produces one `SEND` frame with a `destination` header; resolves once
    /// the frame has been written and flushed.
    pub async fn publish(&self, destination: &str, body: impl AsRef<[u8]>) -> Result<()> {
        self.publish_with_headers(destination, body, HeaderMap::new())
            .await
    }

    /// Publish with additional headers.
    ///
    /// A caller-supplied `destination` header is overridden by the
    /// `destination` argument.
    pub async fn publish_with_headers(
        &self,
        destination: &str,
        body: impl AsRef<[u8]>,
        headers: HeaderMap,
    ) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send_command(Command::Publish {
            destination: destination.to_string(),
            headers,
            body: Bytes::copy_from_slice(body.as_ref()),
            done: done_tx,
        })
        .await?;
        done_rx.await.map_err(|_| StompError::ConnectionClosed)?
    }

    /// Subscribe to a destination with a message listener.
    ///
    /// The listener receives (body, headers) for each `MESSAGE` on the
    /// destination, in registration order when several are attached. While
    /// connected this also sends a `SUBSCRIBE` frame immediately; the
    /// registration itself survives reconnects and is replayed.
    pub async fn subscribe(
        &self,
        destination: &str,
        listener: impl Fn(&[u8], &HeaderMap) + Send + Sync + 'static,
    ) -> Result<()> {
        self.subscribe_with_headers(destination, HeaderMap::new(), listener)
            .await
    }

    /// Subscribe with extra headers sent on every (re)subscribe.
    pub async fn subscribe_with_headers(
        &self,
        destination: &str,
        headers: HeaderMap,
        listener: impl Fn(&[u8], &HeaderMap) + Send + Sync + 'static,
    ) -> Result<()> {
        let listener: MessageListener = Arc::new(listener);
        let (done_tx, done_rx) = oneshot::channel();
        self.send_command(Command::Subscribe {
            destination: destination.to_string(),
            headers,
            listener: Some(listener),
            done: done_tx,
        })
        .await?;
        done_rx.await.map_err(|_| StompError::SessionClosed)?
    }

    /// Remove a destination from the registry.
    ///
    /// A `MESSAGE` still in flight for the removed destination is silently
    /// ignored when it arrives.
    pub async fn unsubscribe(&self, destination: &str) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send_command(Command::Unsubscribe {
            destination: destination.to_string(),
            done: done_tx,
        })
        .await?;
        done_rx.await.map_err(|_| StompError::SessionClosed)?
    }

    /// Gracefully disconnect.
    ///
    /// Cancels any pending reconnect, sends a `DISCONNECT` frame when
    /// connected, closes the transport, and resolves only once closure is
    /// confirmed.
    pub async fn disconnect(self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send_command(Command::Disconnect { done: done_tx })
            .await?;
        done_rx.await.map_err(|_| StompError::SessionClosed)
    }

    async fn send_command(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| StompError::SessionClosed)
    }
}
