//! Mock server listener.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use super::MockPeer;

/// Server name the mock uses as its message source.
pub const SERVER_NAME: &str = "mock.server";

/// A listening mock IRC server on an ephemeral localhost port.
pub struct MockServer {
    listener: TcpListener,
    port: u16,
}

impl MockServer {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    /// `host:port` for a client to dial.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Accept the next client connection.
    pub async fn accept(&self) -> anyhow::Result<MockPeer> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        Ok(MockPeer::new(stream))
    }
}
