//! Unix socket server for the stub daemon.
//!
//! Listens on a filesystem path, accepts client connections, and answers
//! every framed request through a [`Dispatch`] implementation.
//!
//! # Thread Safety
//!
//! The server runs on a tokio runtime. Each connection is handled in its own
//! spawned task; the dispatcher is shared via `Arc` and synchronizes its own
//! state.

use crate::dispatch::Dispatch;
use kiln_core::codec;
use kiln_core::config::RpcConfig;
use kiln_core::error::TransportError;
use kiln_core::{ErrorCode, Response};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Upper bound on simultaneously served connections.
pub const MAX_CONNECTIONS: usize = 64;

/// Counters and fault switches shared between the server and its handle.
#[derive(Debug, Default)]
pub struct ServerStats {
    requests: AtomicUsize,
    drop_replies: AtomicUsize,
    active_connections: AtomicUsize,
}

impl ServerStats {
    /// Requests read off the socket, dropped ones included.
    pub fn requests_served(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Close the connection instead of answering the next `count` requests.
    pub fn drop_next_replies(&self, count: usize) {
        self.drop_replies.store(count, Ordering::SeqCst);
    }

    fn take_drop(&self) -> bool {
        self.drop_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A bound, not yet serving, stub daemon socket.
pub struct StubDaemon {
    listener: UnixListener,
    path: PathBuf,
    stats: Arc<ServerStats>,
}

impl StubDaemon {
    /// Bind the socket at `path`. Must be called inside a tokio runtime.
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let listener = UnixListener::bind(&path)?;
        info!("Stub daemon listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            stats: Arc::new(ServerStats::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Serve until `shutdown` resolves, then close every open connection.
    pub async fn serve<D, F>(self, dispatch: Arc<D>, shutdown: F)
    where
        D: Dispatch,
        F: Future<Output = ()>,
    {
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stub daemon shutting down");
                    break;
                }
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let current = self.stats.active_connections.load(Ordering::Relaxed);
                            if current >= MAX_CONNECTIONS {
                                warn!("Rejecting connection: at max capacity ({})", MAX_CONNECTIONS);
                                continue;
                            }

                            self.stats.active_connections.fetch_add(1, Ordering::Relaxed);
                            let dispatch = dispatch.clone();
                            let stats = self.stats.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &*dispatch, &stats, &mut conn_shutdown).await {
                                    debug!("Connection ended: {}", e);
                                }
                                stats.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        let _ = conn_shutdown_tx.send(true);
        let _ = std::fs::remove_file(&self.path);
    }

    /// Bind `path` and serve `dispatch` from a background thread with its
    /// own runtime. Returns once the socket accepts connections.
    pub fn spawn<D: Dispatch>(
        path: impl Into<PathBuf>,
        dispatch: Arc<D>,
    ) -> io::Result<StubDaemonHandle> {
        let path = path.into();
        let (ready_tx, ready_rx) = mpsc::channel::<io::Result<Arc<ServerStats>>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let bind_path = path.clone();
        let thread = thread::Builder::new()
            .name("kiln-stubd".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let server = match StubDaemon::bind(bind_path) {
                        Ok(server) => server,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(server.stats()));
                    server
                        .serve(dispatch, async {
                            let _ = shutdown_rx.await;
                        })
                        .await;
                });
            })?;

        let stats = ready_rx.recv().map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "stub daemon thread exited early")
        })??;

        Ok(StubDaemonHandle {
            path,
            stats,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

/// Handle to a stub daemon running on a background thread.
/// Dropping it shuts the daemon down and removes the socket file.
pub struct StubDaemonHandle {
    path: PathBuf,
    stats: Arc<ServerStats>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StubDaemonHandle {
    /// Socket path clients connect to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn requests_served(&self) -> usize {
        self.stats.requests_served()
    }

    /// Close the connection instead of answering the next `count` requests.
    pub fn drop_next_replies(&self, count: usize) {
        self.stats.drop_next_replies(count);
    }

    /// Stop accepting, close all connections, and wait for the thread.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Stub daemon thread panicked");
            }
        }
    }
}

impl Drop for StubDaemonHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection<D: Dispatch + ?Sized>(
    mut stream: UnixStream,
    dispatch: &D,
    stats: &ServerStats,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let (mut reader, mut writer) = stream.split();

    loop {
        let frame = tokio::select! {
            result = read_frame(&mut reader) => {
                match result? {
                    Some(f) => f,
                    None => return Ok(()), // Clean disconnect
                }
            }
            _ = shutdown_rx.changed() => {
                return Ok(());
            }
        };

        stats.requests.fetch_add(1, Ordering::SeqCst);
        if stats.take_drop() {
            debug!("Dropping connection without reply (fault injection)");
            return Ok(());
        }

        let response = match codec::decode_request(&frame) {
            Ok(request) => {
                debug!("Dispatching {}", request.method());
                // A `wait` can stall here indefinitely.
                tokio::select! {
                    response = dispatch.dispatch(request) => response,
                    _ = shutdown_rx.changed() => return Ok(()),
                }
            }
            Err(e) => Response::error(ErrorCode::InvalidMethod, format!("Parse error: {}", e)),
        };

        let bytes = codec::encode_response(&response)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
}

/// Read a length-prefixed frame. `None` on clean EOF before a header.
async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut header = [0u8; RpcConfig::FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = codec::frame_len(header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Request;
    use std::time::Duration;

    /// Never answers.
    struct Stalled;

    #[async_trait::async_trait]
    impl Dispatch for Stalled {
        async fn dispatch(&self, _request: Request) -> Response {
            std::future::pending::<Response>().await
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_read_frame_roundtrip() {
        let frame = codec::encode_frame(b"{\"list\":{}}").unwrap();
        let mut cursor = io::Cursor::new(frame);
        let payload = read_frame(&mut cursor).await.unwrap();
        assert_eq!(payload, Some(b"{\"list\":{}}".to_vec()));
    }

    #[tokio::test]
    async fn test_read_frame_empty_stream_returns_none() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_oversized_returns_error() {
        let huge_len = (RpcConfig::MAX_MESSAGE_SIZE + 1) as u32;
        let mut cursor = io::Cursor::new(huge_len.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_drop_counter_counts_down() {
        let stats = ServerStats::default();
        assert!(!stats.take_drop());

        stats.drop_next_replies(2);
        assert!(stats.take_drop());
        assert!(stats.take_drop());
        assert!(!stats.take_drop());
    }

    #[tokio::test]
    async fn test_shutdown_releases_connection_stuck_in_dispatch() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("stub.socket");
        let server = StubDaemon::bind(&path).unwrap();
        let stats = server.stats();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(server.serve(Arc::new(Stalled), async {
            let _ = shutdown_rx.await;
        }));

        let mut client = UnixStream::connect(&path).await.unwrap();
        let frame = codec::encode_request(&Request::Wait {
            names: vec!["a".into()],
        })
        .unwrap();
        client.write_all(&frame).await.unwrap();

        wait_until(|| stats.requests_served() == 1).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        shutdown_tx.send(()).unwrap();
        serving.await.unwrap();

        // The client is still connected; only the shutdown can free the slot.
        wait_until(|| stats.active_connections.load(Ordering::Relaxed) == 0).await;
        assert!(!path.exists());
    }
}
