//! Integration test common infrastructure.
//!
//! Provides a scripted mock IRC server that accepts a tether connection
//! and asserts on the lines it sends.

pub mod peer;
pub mod server;

#[allow(unused_imports)]
pub use peer::MockPeer;
#[allow(unused_imports)]
pub use server::MockServer;

use std::time::Duration;

use tether::{ClientConfig, Connection, ConnectionOptions, FloodProfile};

/// Options for tests: no signal handling, no flood pacing, short timers.
#[allow(dead_code)]
pub fn test_options() -> ConnectionOptions {
    ConnectionOptions {
        flood: FloodProfile::unlimited(),
        handle_signals: false,
        dial_timeout: Duration::from_secs(5),
        quit_grace: Duration::from_millis(100),
        sasl_timeout: Duration::from_secs(2),
        ..ConnectionOptions::default()
    }
}

/// Poll `check` until it holds, failing after two seconds.
#[allow(dead_code)]
pub async fn eventually<F>(what: &str, mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// A plaintext connection to `server` as `nick`.
#[allow(dead_code)]
pub fn test_connection(server: &MockServer, nick: &str, options: ConnectionOptions) -> Connection {
    Connection::new(ClientConfig::new(server.address(), nick), options)
}
