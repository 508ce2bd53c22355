//! TCP transport server.
//!
//! Binds a listener, accepts connections, and runs one task per connection
//! that reads lines and hands them to the dispatch layer.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{SessionError, TransportError};
use crate::session::Session;

/// Creates one [`LineDispatch`] per accepted connection.
pub trait ConnectionHandler: Send + Sync + 'static {
    type Dispatch: LineDispatch;

    /// Called once per connection, before the first line is read.
    fn open(&self, session: Arc<Session>) -> Self::Dispatch;
}

/// Per-connection control loop state.
pub trait LineDispatch: Send + 'static {
    /// Handle one inbound line (newline stripped). Returning an error ends
    /// the connection.
    fn handle_line(
        &mut self,
        line: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Called exactly once when the read loop ends, however it ended.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hostname to bind to
    pub hostname: String,
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Upper bound on a single line write to a session
    pub write_timeout: Duration,
    /// Upper bound on the courtesy close of a session during cleanup
    pub close_timeout: Duration,
    /// Log every inbound line at debug level
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".into(),
            port: 8081,
            max_connections: Some(1024),
            write_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(1),
            verbose_logging: false,
        }
    }
}

/// The transport server: owns the accept loop task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Accept loop task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address
    local_addr: SocketAddr,
    /// Live connection count
    client_count: Arc<AtomicUsize>,
}

impl TransportServer {
    /// Bind and start accepting connections.
    pub async fn start<H: ConnectionHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_with_handler(config, Arc::new(handler)).await
    }

    /// Start with a handler that is shared with other subsystems.
    pub async fn start_with_handler<H: ConnectionHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.hostname, config.port);
        let listener = TcpListener::bind((config.hostname.as_str(), config.port))
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!("Dispatch transport listening on {local_addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let client_count = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(accept_loop(
            listener,
            handler,
            Arc::new(config),
            client_count.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            local_addr,
            client_count,
        })
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Number of connections currently being served.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Stop accepting new connections. Connections already open keep running
    /// until their peers disconnect.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Dispatch transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept loop
// ─────────────────────────────────────────────────────────────────────────────

async fn accept_loop<H: ConnectionHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    config: Arc<TransportConfig>,
    client_count: Arc<AtomicUsize>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Accept loop shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let Some(slot) = ConnectionSlot::acquire(&client_count, config.max_connections) else {
                            warn!(
                                "Connection from {peer} rejected: max connections reached ({})",
                                config.max_connections.unwrap_or_default()
                            );
                            drop(stream);
                            continue;
                        };

                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            handler.clone(),
                            config.clone(),
                            slot,
                        ));
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        error!("Accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

async fn handle_connection<H: ConnectionHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    config: Arc<TransportConfig>,
    slot: ConnectionSlot,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed for {peer}: {e}");
    }

    let (read_half, write_half) = stream.into_split();
    let session = Arc::new(Session::new(peer.to_string(), write_half, config.write_timeout));
    info!("Client connected: {} ({peer})", session.id());

    let dispatch = handler.open(session.clone());
    run_session(
        read_half,
        session.clone(),
        dispatch,
        config.close_timeout,
        config.verbose_logging,
    )
    .await;

    let remaining = slot.release();
    info!(
        "Client disconnected: {} after {:?}, idle {:?} (total: {remaining})",
        session.id(),
        session.age(),
        session.idle(),
    );
}

/// One counted connection. Taken in the accept loop before the task is
/// spawned; the count goes back down when the slot is dropped, including when
/// the connection task panics.
struct ConnectionSlot {
    count: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(count: &Arc<AtomicUsize>, max: Option<usize>) -> Option<Self> {
        count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .ok()?;
        Some(Self {
            count: count.clone(),
        })
    }

    /// Give the slot back; returns the remaining count.
    fn release(self) -> usize {
        let count = self.count.clone();
        drop(self);
        count.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Drive one connection: read lines until the peer goes away or the
/// dispatch fails, then run the dispatch's cleanup and close the session.
///
/// Exposed so the read loop can run over any byte stream, not only TCP.
pub async fn run_session<R, D>(
    reader: R,
    session: Arc<Session>,
    mut dispatch: D,
    close_timeout: Duration,
    verbose: bool,
) where
    R: AsyncRead + Unpin + Send,
    D: LineDispatch,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                session.touch();
                if verbose {
                    debug!("[{}] <- {line}", session.id());
                }
                if let Err(e) = dispatch.handle_line(&line).await {
                    warn!("Write to {} failed, dropping connection: {e}", session.id());
                    break;
                }
            }
            Ok(None) => {
                debug!("Peer closed connection: {}", session.id());
                break;
            }
            Err(e) => {
                warn!("Read error for {}: {e}", session.id());
                break;
            }
        }
    }

    dispatch.close().await;
    session.close(close_timeout).await;
}
