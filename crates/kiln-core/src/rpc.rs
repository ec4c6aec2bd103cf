//! RPC engine: one connection, send-then-receive, retry and reconnect.
//!
//! Per call the engine walks this loop:
//!
//! ```text
//! Disconnected --connect ok--> Connected --exchange ok--> reply
//!      |                            |
//!      | EACCES / ENOENT            | write/read/decode failed
//!      v                            v
//!  Failed(fatal)              close handle, Failed(retryable)
//!                                   |
//!                  budget left: sleep, back to Disconnected
//!                  budget gone: last transport error
//! ```
//!
//! A decoded reply ends the loop whatever its error field says. Server
//! errors are facts about the request, so re-sending it is never done here.
//!
//! # Thread Safety
//!
//! Calls take `&mut self`: one engine serves one caller at a time. Use one
//! engine per thread, or wrap it in a mutex.

use crate::codec;
use crate::config::ClientOptions;
use crate::error::{CallError, TransportError};
use crate::protocol::{Request, Response, ResponsePayload};
use crate::retry::{retry_blocking, RetryPolicy};
use crate::transport::{Connector, UnixConnector};
use std::io::{Read, Write};
use tracing::{debug, warn};

/// At most one live transport handle.
///
/// The handle is either protocol-ready or absent; any failed exchange
/// drops it, which closes the descriptor.
#[derive(Debug)]
pub struct Connection<S> {
    stream: Option<S>,
}

impl<S> Default for Connection<S> {
    fn default() -> Self {
        Self { stream: None }
    }
}

impl<S> Connection<S> {
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Return the live handle, opening one with `connect` if there is none.
    pub fn ensure<F>(&mut self, connect: F) -> Result<&mut S, TransportError>
    where
        F: FnOnce() -> Result<S, TransportError>,
    {
        if self.stream.is_none() {
            self.stream = Some(connect()?);
        }
        self.stream.as_mut().ok_or(TransportError::Closed)
    }

    /// Drop the handle if there is one. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Connection closed");
        }
    }
}

/// Drives requests through the codec over a [`Connector`].
pub struct RpcClient<C: Connector = UnixConnector> {
    connector: C,
    connection: Connection<C::Stream>,
    policy: RetryPolicy,
}

impl RpcClient<UnixConnector> {
    /// Engine talking to the Unix socket named in `options`.
    pub fn new(options: &ClientOptions) -> Self {
        let connector = UnixConnector::new(options.socket_path.clone())
            .with_receive_timeout(options.receive_timeout);
        Self::with_connector(connector, options.retry_policy())
    }
}

impl<C: Connector> RpcClient<C> {
    pub fn with_connector(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            connection: Connection::default(),
            policy,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Open the connection now instead of on the next call.
    ///
    /// Does nothing if a handle is already live. No retries.
    pub fn connect(&mut self) -> Result<(), CallError> {
        let connector = &self.connector;
        self.connection.ensure(|| connector.connect())?;
        Ok(())
    }

    /// Close the connection. The next call reconnects.
    pub fn disconnect(&mut self) {
        self.connection.close();
    }

    /// Send one request and return the payload of a successful reply.
    ///
    /// The request is consumed: nothing of it survives the call. Transport
    /// failures are retried according to the policy, except fatal connect
    /// errors. A non-zero error in a decoded reply is returned as is.
    pub fn call(&mut self, request: Request) -> Result<Option<ResponsePayload>, CallError> {
        let method = request.method();
        let frame =
            codec::encode_request(&request).map_err(|e| CallError::local(e.to_string()))?;
        drop(request);

        let policy = self.policy;
        let (result, stats) = retry_blocking(
            &policy,
            || self.attempt(&frame),
            TransportError::is_retryable,
        );

        match result {
            Ok(response) => {
                debug!(
                    method,
                    attempts = stats.attempts,
                    error = response.error,
                    "RPC reply received"
                );
                response.into_result()
            }
            Err(err) => {
                warn!(
                    method,
                    attempts = stats.attempts,
                    "RPC failed: {}",
                    err
                );
                Err(err.into())
            }
        }
    }

    /// One pass through connect, send, and receive.
    fn attempt(&mut self, frame: &[u8]) -> Result<Response, TransportError> {
        let connector = &self.connector;
        let stream = self.connection.ensure(|| connector.connect())?;

        let exchanged = exchange(stream, frame);
        if exchanged.is_err() {
            self.connection.close();
        }
        exchanged
    }
}

fn exchange<S: Read + Write>(stream: &mut S, frame: &[u8]) -> Result<Response, TransportError> {
    stream.write_all(frame)?;
    stream.flush()?;
    codec::decode_response(stream)
}
