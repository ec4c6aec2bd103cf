//! Transport connector for the daemon control socket.
//!
//! A [`Connector`] only opens connections. It knows nothing about framing
//! or retries; the RPC engine owns both. Tests inject their own connector
//! to count attempts or serve in-memory streams.

use crate::error::TransportError;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Opens one connection to the daemon per call.
pub trait Connector {
    type Stream: Read + Write;

    /// Open a new connection. No retries happen here.
    fn connect(&self) -> Result<Self::Stream, TransportError>;
}

/// Connects to a Unix domain socket addressed by a filesystem path.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
    receive_timeout: Option<Duration>,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            receive_timeout: None,
        }
    }

    /// Bound every blocking read on connections this connector opens.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&self) -> Result<UnixStream, TransportError> {
        let connect_err = |source: std::io::Error| TransportError::Connect {
            path: self.path.clone(),
            source,
        };

        let stream = UnixStream::connect(&self.path).map_err(connect_err)?;
        stream
            .set_read_timeout(self.receive_timeout)
            .map_err(connect_err)?;

        debug!("Connected to {}", self.path.display());
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::net::UnixListener;
    use std::time::Instant;

    #[test]
    fn test_connect_missing_socket_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let connector = UnixConnector::new(dir.path().join("missing.socket"));

        let err = connector.connect().unwrap_err();
        assert!(err.is_fatal(), "Expected fatal error, got: {:?}", err);
        match err {
            TransportError::Connect { path, source } => {
                assert_eq!(path, dir.path().join("missing.socket"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("Expected Connect, got: {:?}", other),
        }
    }

    #[test]
    fn test_connect_stale_socket_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.socket");
        // Binding leaves the socket file behind after the listener is gone.
        drop(UnixListener::bind(&path).unwrap());

        let err = UnixConnector::new(&path).connect().unwrap_err();
        assert!(err.is_retryable(), "Expected retryable error, got: {:?}", err);
    }

    #[test]
    fn test_connect_applies_receive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.socket");
        // Never accepted, never written to: the connection waits in the backlog.
        let _listener = UnixListener::bind(&path).unwrap();

        let mut stream = UnixConnector::new(&path)
            .with_receive_timeout(Some(Duration::from_millis(50)))
            .connect()
            .unwrap();

        let started = Instant::now();
        let err = stream.read(&mut [0u8; 1]).unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
            "Expected a timeout, got: {:?}",
            err
        );
        assert!(elapsed >= Duration::from_millis(40), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }
}
