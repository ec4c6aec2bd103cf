//! Test double for the kiln daemon.
//!
//! [`MemoryDaemon`] keeps containers and volumes in memory and answers the
//! same control socket protocol as the real daemon. [`StubDaemon`] serves any
//! [`Dispatch`] implementation on a Unix socket, with fault injection for
//! exercising client reconnects.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_core::{Client, ClientOptions};
//! use kiln_testing::MemoryDaemon;
//!
//! let daemon = MemoryDaemon::spawn("/tmp/kilnd-test.socket")?;
//! let mut client = Client::new(ClientOptions::new().with_socket_path(daemon.path()));
//! client.create("web")?;
//! assert_eq!(client.list()?, vec!["web".to_string()]);
//! ```

pub mod dispatch;
pub mod memory;
pub mod server;

pub use dispatch::Dispatch;
pub use memory::{ContainerState, MemoryDaemon};
pub use server::{ServerStats, StubDaemon, StubDaemonHandle, MAX_CONNECTIONS};
