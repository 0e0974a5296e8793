//! PING handler.

use std::sync::Arc;

use async_trait::async_trait;
use tether_proto::Message;
use tracing::warn;

use crate::Connection;
use crate::connection::Outbox;
use crate::dispatch::InboundHandler;

/// Answers server PINGs.
pub struct PingHandler {
    outbox: Outbox,
}

impl PingHandler {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl InboundHandler for PingHandler {
    async fn handle(&self, _conn: Connection, msg: Arc<Message>) {
        // PING <token>
        let pong = match msg.param(0) {
            Some(token) => format!("PONG :{}", token),
            None => "PONG".to_string(),
        };
        if let Err(e) = self.outbox.send(pong).await {
            warn!(error = %e, "Failed to answer PING");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{detached, outbox};

    #[tokio::test]
    async fn test_pong_echoes_token() {
        let (conn, mut rx) = detached();
        let msg = Message::parse("PING :irc.example.net", "irc.test").unwrap();
        PingHandler::new(outbox(&conn)).handle(conn, Arc::new(msg)).await;
        assert_eq!(rx.recv().await.unwrap(), "PONG :irc.example.net\r\n");
    }

    #[tokio::test]
    async fn test_pong_without_token() {
        let (conn, mut rx) = detached();
        let msg = Message::parse(":irc.test PING", "irc.test").unwrap();
        PingHandler::new(outbox(&conn)).handle(conn, Arc::new(msg)).await;
        assert_eq!(rx.recv().await.unwrap(), "PONG\r\n");
    }
}
