//! tether - an IRCv3 client connection engine.
//!
//! A [`Connection`] dials a server (plain or TLS), registers, negotiates
//! capabilities and SASL, answers keepalives, paces outbound traffic and
//! reports how the session ended. Applications add behaviour with handlers
//! keyed by verb and with typed [`EventBus`] topics.
//!
//! ```no_run
//! use tether::{ClientConfig, Connection, ConnectionOptions};
//!
//! # async fn run() -> tether::ConnectionResult {
//! let conn = Connection::new(
//!     ClientConfig::new("irc.libera.chat:6697", "tether").with_tls(true),
//!     ConnectionOptions::default(),
//! );
//! conn.add_inbound_handler("PRIVMSG", |conn, msg| async move {
//!     if msg.trailing() == Some("!ping") {
//!         if let Some(target) = msg.param(0) {
//!             let _ = conn.send_raw(format!("PRIVMSG {target} :pong")).await;
//!         }
//!     }
//! });
//! conn.connect_and_wait_with_retry(10).await
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod flood;
pub mod handlers;
pub mod telemetry;

pub use connection::{
    ClientConfig, Connection, ConnectionOptions, ConnectionState, SaslCredentials,
};
pub use dispatch::{
    ChannelPart, Dispatcher, EventBus, InboundHandler, OutboundHandler, RawHandler, RawLine,
    Subscriber, SubscriptionId,
};
pub use error::{ConnectionError, ConnectionResult};
pub use flood::FloodProfile;

/// Wire-level protocol types.
pub use tether_proto as proto;
