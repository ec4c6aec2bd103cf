//! Kiln Core - client library for the kiln container daemon.
//!
//! The daemon listens on a Unix domain socket and speaks length-prefixed
//! JSON envelopes. This crate provides the client side of that channel,
//! layered leaves first:
//!
//! - [`transport`]: opens socket connections
//! - [`codec`]: frames and parses envelopes
//! - [`rpc`]: one connection, retry and reconnect, error normalization
//! - [`api`]: typed container and volume operations
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_core::{Client, ClientOptions};
//!
//! fn main() -> kiln_core::Result<()> {
//!     let mut client = Client::new(ClientOptions::new());
//!
//!     client.create("build")?;
//!     client.set_property("build", "command", "make -j8")?;
//!     client.start("build")?;
//!
//!     let finished = client.wait(&["build"])?;
//!     println!("{} finished", finished);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod retry;
pub mod rpc;
pub mod transport;

// Re-export commonly used types
pub use api::{Client, GetResult, GetValue};
pub use config::{ClientOptions, RpcConfig};
pub use error::{CallError, ErrorCode, ErrorOrigin, FsError, Result, TransportError};
pub use protocol::{Descriptor, Request, Response, ResponsePayload, Version, VolumeDescription};
pub use retry::{RetryPolicy, RetryStats};
pub use rpc::{Connection, RpcClient};
pub use transport::{Connector, UnixConnector};
