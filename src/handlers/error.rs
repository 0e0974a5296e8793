//! Server ERROR handler.

use std::sync::Arc;

use async_trait::async_trait;
use tether_proto::Message;
use tracing::warn;

use crate::Connection;
use crate::connection::Lifecycle;
use crate::dispatch::InboundHandler;
use crate::error::ConnectionError;

/// Ends the session when the server sends ERROR.
///
/// Bound to one session's lifecycle so a late ERROR from a dead session
/// cannot end its successor.
pub struct ErrorHandler {
    lifecycle: Arc<Lifecycle>,
}

impl ErrorHandler {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl InboundHandler for ErrorHandler {
    async fn handle(&self, _conn: Connection, msg: Arc<Message>) {
        let reason = msg.trailing().unwrap_or_default().to_string();
        warn!(%reason, "Server sent ERROR");
        self.lifecycle.fail(ConnectionError::ServerError(reason));
    }
}
