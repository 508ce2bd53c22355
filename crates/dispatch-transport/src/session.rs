//! Per-connection session: the single writable channel to one client.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dispatch_protocol::ServerMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type LineWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A connected client's outbound half.
///
/// The owning dispatch writes responses through it, and any other dispatch
/// that resolved it from the registry may write notifications concurrently.
/// Each write is one whole line followed by a flush, done under the writer
/// lock, so lines from different callers never interleave.
///
/// A write that fails or times out poisons the session: it is marked closed
/// and every later write fails fast with [`SessionError::Closed`].
///
/// [`SessionError::Closed`]: crate::SessionError::Closed
pub struct Session {
    id: String,
    peer: String,
    connected_at: Instant,
    last_activity: parking_lot::Mutex<Instant>,
    writer: Mutex<Option<LineWriter>>,
    closed: AtomicBool,
    write_timeout: Duration,
}

impl Session {
    pub fn new<W>(peer: impl Into<String>, writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            peer: peer.into(),
            connected_at: now,
            last_activity: parking_lot::Mutex::new(now),
            writer: Mutex::new(Some(Box::pin(writer))),
            closed: AtomicBool::new(false),
            write_timeout,
        }
    }

    /// Unique session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Time since the last inbound line.
    pub fn idle(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Write a protocol message as one line.
    pub async fn send(&self, message: &ServerMessage) -> Result<(), crate::SessionError> {
        self.send_line(&message.to_string()).await
    }

    /// Write `line` followed by `\n` and flush, bounded by the write timeout.
    pub async fn send_line(&self, line: &str) -> Result<(), crate::SessionError> {
        if self.is_closed() {
            return Err(crate::SessionError::Closed);
        }

        let mut frame = String::with_capacity(line.len() + 1);
        frame.push_str(line);
        frame.push('\n');

        let write = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(crate::SessionError::Closed)?;
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await?;
            Ok::<(), crate::SessionError>(())
        };

        let result = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(crate::SessionError::Timeout(self.write_timeout)),
        };

        if let Err(ref e) = result {
            if !matches!(e, crate::SessionError::Closed) {
                debug!("Session {} poisoned by failed write: {e}", self.id);
            }
            self.closed.store(true, Ordering::Release);
        }
        result
    }

    /// Shut down the write side. Idempotent; gives up after `grace` if
    /// another writer holds the lock on a stalled peer.
    pub async fn close(&self, grace: Duration) {
        self.closed.store(true, Ordering::Release);

        let shutdown = async {
            let mut guard = self.writer.lock().await;
            if let Some(mut writer) = guard.take() {
                if let Err(e) = writer.shutdown().await {
                    debug!("Session {} shutdown error: {e}", self.id);
                }
            }
        };

        if tokio::time::timeout(grace, shutdown).await.is_err() {
            warn!("Session {} ({}) did not close within {grace:?}", self.id, self.peer);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
