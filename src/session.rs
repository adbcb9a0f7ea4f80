//! Session task: connection lifecycle, dispatch, and reconnection.
//!
//! The session runs as one spawned task owning the transport, the frame
//! assembler, the subscription registry, and the retry counter. The public
//! [`StompClient`](crate::StompClient) handle talks to it over an mpsc
//! command channel, so every piece of protocol state is mutated on a single
//! serialized path: no two byte deliveries or commands are ever processed
//! concurrently against the same assembler or registry.
//!
//! Lifecycle per connection attempt: dial, wire up a fresh assembler, send
//! `CONNECT`, replay subscriptions after a reconnect, then loop over inbound
//! bytes and outbound commands until the connection ends. Transport failures
//! feed the linear-backoff reconnect path; a graceful disconnect ends the
//! task for good.

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::config::SessionConfig;
use crate::error::{Result, StompError};
use crate::protocol::{schema, Frame, FrameAssembler, HeaderMap, ParserEvent, ProtocolVersion};
use crate::transport::{self, Transport};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Callback invoked for each MESSAGE delivered to a subscription.
pub type MessageListener = Arc<dyn Fn(&[u8], &HeaderMap) + Send + Sync>;

/// Registered event handlers, invoked synchronously on the session task in
/// registration order.
#[derive(Default)]
pub(crate) struct EventHandlers {
    pub on_connect: Vec<Box<dyn Fn(&str) + Send>>,
    pub on_reconnect: Vec<Box<dyn Fn(&str) + Send>>,
    pub on_reconnecting: Vec<Box<dyn Fn() + Send>>,
    pub on_message: Vec<Box<dyn Fn(&[u8], &HeaderMap) + Send>>,
    pub on_error: Vec<Box<dyn Fn(&StompError) + Send>>,
}

/// A request from the client handle to the session task.
pub(crate) enum Command {
    Publish {
        destination: String,
        headers: HeaderMap,
        body: Bytes,
        done: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        destination: String,
        headers: HeaderMap,
        listener: Option<MessageListener>,
        done: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        destination: String,
        done: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
}

/// One destination's registry entry. Lives for the lifetime of the session,
/// independent of individual connection attempts.
struct Subscription {
    /// Headers sent on (re)subscribe.
    headers: HeaderMap,
    /// Listeners invoked in registration order.
    listeners: Vec<MessageListener>,
}

/// Why a connection attempt ended.
enum ConnectionEnd {
    /// Transport-level failure; eligible for the reconnect path.
    Failed(StompError),
    /// Parse or validation failure, already surfaced to the error handlers.
    /// The transport was forcibly closed; reconnection may still engage.
    ParseFailure,
    /// Graceful disconnect completed; the callback has fired.
    Disconnected,
    /// Every client handle is gone.
    Shutdown,
}

pub(crate) struct Session {
    config: SessionConfig,
    handlers: EventHandlers,
    subscriptions: IndexMap<String, Subscription>,
    /// Consecutive failed attempts since the last CONNECTED.
    retries: u32,
    commands: mpsc::Receiver<Command>,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        handlers: EventHandlers,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            config,
            handlers,
            subscriptions: IndexMap::new(),
            retries: 0,
            commands,
        }
    }

    /// Drive the session until disconnect, retry exhaustion, or handle drop.
    pub(crate) async fn run(mut self) {
        loop {
            let end = match transport::connect(&self.config).await {
                Ok(transport) => self.run_connection(transport).await,
                Err(err) => ConnectionEnd::Failed(err),
            };

            match end {
                ConnectionEnd::Disconnected | ConnectionEnd::Shutdown => return,
                ConnectionEnd::Failed(err) => {
                    if !self.schedule_retry(Some(err)).await {
                        return;
                    }
                }
                ConnectionEnd::ParseFailure => {
                    if !self.schedule_retry(None).await {
                        return;
                    }
                }
            }
        }
    }

    /// Apply the reconnect policy to a connection failure.
    ///
    /// `err` is `None` when the failure was already surfaced to the error
    /// handlers (the parse-failure teardown).
    ///
    /// Returns `true` when another attempt should be made. The backoff is
    /// linear, `attempt * delay`, with zero delay on the very first retry.
    /// The sleep stays responsive to commands so a disconnect can cancel a
    /// pending reconnect.
    async fn schedule_retry(&mut self, err: Option<StompError>) -> bool {
        let policy = self.config.reconnect;

        if self.retries >= policy.retries {
            if let Some(err) = err {
                let err = if policy.retries > 0 {
                    StompError::RetriesExhausted {
                        attempts: self.retries,
                        source: Box::new(err),
                    }
                } else {
                    err
                };
                tracing::error!("connection failed: {err}");
                self.emit_error(&err);
            }
            return false;
        }

        if self.retries == 0 {
            for handler in &self.handlers.on_reconnecting {
                handler();
            }
        }

        let delay = policy.delay * self.retries;
        self.retries += 1;
        tracing::debug!(attempt = self.retries, ?delay, "scheduling reconnect");

        let timer = sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return true,
                command = self.commands.recv() => match command {
                    None => return false,
                    Some(Command::Disconnect { done }) => {
                        // cancels the pending reconnect
                        let _ = done.send(());
                        return false;
                    }
                    Some(command) => self.handle_offline_command(command),
                }
            }
        }
    }

    /// Commands arriving while no transport is open.
    ///
    /// Registry edits apply immediately (and will be replayed on reconnect);
    /// publishes have nowhere to go.
    fn handle_offline_command(&mut self, command: Command) {
        match command {
            Command::Publish { done, .. } => {
                let _ = done.send(Err(StompError::ConnectionClosed));
            }
            Command::Subscribe {
                destination,
                headers,
                listener,
                done,
            } => {
                self.register_subscription(destination, headers, listener);
                let _ = done.send(Ok(()));
            }
            Command::Unsubscribe { destination, done } => {
                self.subscriptions.swap_remove(&destination);
                let _ = done.send(Ok(()));
            }
            Command::Disconnect { .. } => unreachable!("handled by caller"),
        }
    }

    fn register_subscription(
        &mut self,
        destination: String,
        mut headers: HeaderMap,
        listener: Option<MessageListener>,
    ) {
        // SUBSCRIBE frames, including reconnect replays, are built from the
        // stored headers, so the destination must always be among them
        headers.insert("destination".to_string(), destination.clone());
        let entry = self
            .subscriptions
            .entry(destination)
            .or_insert_with(|| Subscription {
                headers: headers.clone(),
                listeners: Vec::new(),
            });
        entry.headers = headers;
        if let Some(listener) = listener {
            entry.listeners.push(listener);
        }
    }

    /// Run one connection attempt to completion.
    async fn run_connection(&mut self, transport: Transport) -> ConnectionEnd {
        let (mut reader, write_half) = tokio::io::split(transport);
        let (writer, writer_task) = spawn_writer_task(write_half);
        let mut assembler = FrameAssembler::new(schema::for_version(self.config.version));
        let mut pending_disconnect: Option<oneshot::Sender<()>> = None;

        if let Err(err) = self.send_handshake(&writer).await {
            writer_task.abort();
            return ConnectionEnd::Failed(err);
        }

        let mut buf = vec![0u8; 8 * 1024];

        let end = loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        if let Some(done) = pending_disconnect.take() {
                            // closure confirmed; only now does the
                            // disconnect callback fire
                            let _ = done.send(());
                            break ConnectionEnd::Disconnected;
                        }
                        break ConnectionEnd::Failed(StompError::ServerGone);
                    }
                    Ok(n) => {
                        if let Some(end) = self.process_bytes(&mut assembler, &buf[..n]) {
                            break end;
                        }
                    }
                    Err(e) => break ConnectionEnd::Failed(e.into()),
                },
                command = self.commands.recv() => match command {
                    None => break ConnectionEnd::Shutdown,
                    Some(command) => {
                        self.handle_command(command, &writer, &mut pending_disconnect).await;
                    }
                }
            }
        };

        writer_task.abort();
        end
    }

    /// Send CONNECT, and after a reconnect replay every registered
    /// subscription so broker-side state is restored.
    async fn send_handshake(&mut self, writer: &WriterHandle) -> Result<()> {
        let mut connect = Frame::with_command("CONNECT");
        connect.set_header("login", self.config.login.clone());
        connect.set_header("passcode", self.config.passcode.clone());
        if self.config.version == ProtocolVersion::V1_1 {
            if let Some(vhost) = &self.config.vhost {
                connect.set_header("host", vhost.clone());
            }
        }
        writer.send(connect.serialize()).await?;

        if self.retries > 0 {
            for subscription in self.subscriptions.values() {
                let mut frame = Frame::with_command("SUBSCRIBE");
                for (key, value) in &subscription.headers {
                    frame.set_header(key.clone(), value.clone());
                }
                writer.send(frame.serialize()).await?;
            }
        }
        Ok(())
    }

    /// Feed inbound bytes through the assembler and route what comes out.
    ///
    /// A parse or validation failure is surfaced to the error handlers and
    /// forcibly ends the connection; the reconnect path takes over from
    /// there.
    fn process_bytes(
        &mut self,
        assembler: &mut FrameAssembler,
        data: &[u8],
    ) -> Option<ConnectionEnd> {
        for event in assembler.push(data) {
            match event {
                ParserEvent::Frame(frame) => self.route_frame(frame),
                ParserEvent::Error(failure) => {
                    let err: StompError = failure.into();
                    tracing::warn!("closing connection: {err}");
                    self.emit_error(&err);
                    return Some(ConnectionEnd::ParseFailure);
                }
            }
        }
        None
    }

    fn route_frame(&mut self, frame: Frame) {
        match frame.command() {
            "CONNECTED" => {
                // `session` is schema-required, so it is present here
                let session = frame.header("session").unwrap_or_default().to_string();
                if self.retries > 0 {
                    self.retries = 0;
                    for handler in &self.handlers.on_reconnect {
                        handler(&session);
                    }
                } else {
                    for handler in &self.handlers.on_connect {
                        handler(&session);
                    }
                }
            }
            "MESSAGE" => {
                let destination = frame.header("destination").unwrap_or_default();
                if let Some(subscription) = self.subscriptions.get(destination) {
                    for listener in &subscription.listeners {
                        listener(frame.body(), frame.headers());
                    }
                } else {
                    // can arrive after unsubscribe, before the broker
                    // catches up; intentionally not an error
                    tracing::debug!(destination, "message for unknown subscription ignored");
                }
                for handler in &self.handlers.on_message {
                    handler(frame.body(), frame.headers());
                }
            }
            "ERROR" => {
                let err = StompError::Broker {
                    message: frame.header("message").unwrap_or_default().to_string(),
                    headers: frame.headers().clone(),
                    body: frame.body().to_vec(),
                };
                self.emit_error(&err);
            }
            other => {
                tracing::debug!(command = other, "ignoring frame");
            }
        }
    }

    async fn handle_command(
        &mut self,
        command: Command,
        writer: &WriterHandle,
        pending_disconnect: &mut Option<oneshot::Sender<()>>,
    ) {
        match command {
            Command::Publish {
                destination,
                mut headers,
                body,
                done,
            } => {
                // destination always overrides a caller-supplied duplicate
                headers.insert("destination".to_string(), destination);
                let frame = Frame::from_parts("SEND", headers, &body);
                // the flush ack resolves the caller's publish future; if the
                // writer is gone the dropped sender does the reporting
                let _ = writer.send_acked(frame.serialize(), done).await;
            }
            Command::Subscribe {
                destination,
                headers,
                listener,
                done,
            } => {
                self.register_subscription(destination.clone(), headers, listener);

                let mut frame = Frame::with_command("SUBSCRIBE");
                if let Some(subscription) = self.subscriptions.get(&destination) {
                    for (key, value) in &subscription.headers {
                        frame.set_header(key.clone(), value.clone());
                    }
                }
                let result = writer.send(frame.serialize()).await;
                let _ = done.send(result);
            }
            Command::Unsubscribe { destination, done } => {
                self.subscriptions.swap_remove(&destination);
                let _ = done.send(Ok(()));
            }
            Command::Disconnect { done } => {
                let frame = Frame::with_command("DISCONNECT");
                let _ = writer.send(frame.serialize()).await;
                // close the write half after the frame is scheduled; the
                // callback waits for the read side to confirm closure
                let _ = writer.shutdown().await;
                *pending_disconnect = Some(done);
            }
        }
    }

    fn emit_error(&self, err: &StompError) {
        for handler in &self.handlers.on_error {
            handler(err);
        }
    }
}
