//! Dedicated writer task for outbound frames.
//!
//! All outbound frames funnel through one mpsc channel into a single task
//! that owns the transport's write half. The channel order is the wire
//! order, which gives the session its write-ordering guarantee without any
//! locking.
//!
//! ```text
//! handshake ─┐
//! publish   ─┼─► mpsc::Sender<WriterMessage> ─► writer task ─► transport
//! subscribe ─┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, StompError};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One unit of work for the writer task.
#[derive(Debug)]
pub enum WriterMessage {
    /// A serialized frame, with an optional completion signal fired once the
    /// bytes have been written and flushed.
    Frame {
        bytes: Bytes,
        done: Option<oneshot::Sender<Result<()>>>,
    },
    /// Flush and shut down the write side of the transport.
    Shutdown,
}

/// Handle for queuing frames to the writer task. Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterMessage>,
}

impl WriterHandle {
    /// Queue a frame, fire-and-forget.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(WriterMessage::Frame { bytes, done: None })
            .await
            .map_err(|_| StompError::ConnectionClosed)
    }

    /// Queue a frame with a completion signal resolved once the write has
    /// flushed.
    ///
    /// If the writer task dies before the write happens, the signal's sender
    /// is dropped and the waiting receiver observes the closure.
    pub async fn send_acked(&self, bytes: Bytes, done: oneshot::Sender<Result<()>>) -> Result<()> {
        self.tx
            .send(WriterMessage::Frame {
                bytes,
                done: Some(done),
            })
            .await
            .map_err(|_| StompError::ConnectionClosed)
    }

    /// Ask the writer task to flush and close the write half.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(WriterMessage::Shutdown)
            .await
            .map_err(|_| StompError::ConnectionClosed)
    }
}

/// Spawn the writer task over a transport write half.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Receive frames and write them in channel order.
async fn writer_loop<W>(mut rx: mpsc::Receiver<WriterMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Frame { bytes, done } => {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                if let Some(done) = done {
                    // Receiver may be gone; the write still happened.
                    let _ = done.send(Ok(()));
                }
            }
            WriterMessage::Shutdown => {
                writer.shutdown().await?;
                return Ok(());
            }
        }
    }
    // All handles dropped, clean shutdown.
    Ok(())
}
