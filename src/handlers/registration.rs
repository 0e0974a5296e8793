//! Registration milestones.

use std::sync::Arc;

use async_trait::async_trait;
use tether_proto::{Message, numeric};
use tracing::info;

use crate::Connection;
use crate::dispatch::InboundHandler;

/// End of the welcome burst (MOTD end or no MOTD).
pub const RPL_ENDOFMOTD: &str = "376";
pub const ERR_NOMOTD: &str = "422";

/// Moves the connection to `Registered` on 001 and `Running` once the
/// welcome burst is over.
pub struct RegistrationHandler;

#[async_trait]
impl InboundHandler for RegistrationHandler {
    async fn handle(&self, conn: Connection, msg: Arc<Message>) {
        match msg.verb.as_str() {
            numeric::RPL_WELCOME => {
                info!(nick = msg.param(0).unwrap_or_default(), "Registered with server");
                conn.mark_registered();
            }
            RPL_ENDOFMOTD | ERR_NOMOTD => conn.mark_running(),
            _ => {}
        }
    }
}
