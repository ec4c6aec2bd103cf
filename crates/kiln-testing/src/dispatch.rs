//! Request dispatch seam of the stub daemon.

use kiln_core::{Request, Response};

/// Answers one decoded request.
///
/// Implementations own their state and synchronize it themselves; the
/// server calls `dispatch` concurrently from one task per connection.
#[async_trait::async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, request: Request) -> Response;
}
