//! Wire logging at debug level.

use std::sync::Arc;

use async_trait::async_trait;
use tether_proto::Message;
use tracing::debug;

use crate::Connection;
use crate::dispatch::{InboundHandler, OutboundHandler};

/// Logs every parsed inbound message and every outbound line.
pub struct DebugHandler;

#[async_trait]
impl InboundHandler for DebugHandler {
    async fn handle(&self, _conn: Connection, msg: Arc<Message>) {
        debug!(target: "tether::wire", "In : {} {} {}", msg.source, msg.verb, msg.params_string());
    }
}

#[async_trait]
impl OutboundHandler for DebugHandler {
    async fn handle(&self, _conn: Connection, line: Arc<str>) {
        debug!(target: "tether::wire", "Out: {}", line.trim_end());
    }
}
