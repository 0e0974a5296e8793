//! Built-in protocol handlers.
//!
//! Installed fresh into every session's dispatcher:
//! - [`cap`]: IRCv3 capability negotiation
//! - [`sasl`]: SASL PLAIN login
//! - [`nick`]: nickname fallback and reclaim
//! - [`support`]: ISUPPORT (005) tracking
//! - [`ping`], [`error`]: keepalive answers and server ERROR
//! - [`registration`]: connection state milestones
//! - [`debug`]: wire logging

pub mod cap;
pub mod debug;
pub mod error;
pub mod nick;
pub mod ping;
pub mod registration;
pub mod sasl;
pub mod support;

pub use cap::CapabilityHandler;
pub use debug::DebugHandler;
pub use error::ErrorHandler;
pub use nick::NickHandler;
pub use ping::PingHandler;
pub use registration::RegistrationHandler;
pub use sasl::{SaslHandler, SaslSignal};
pub use support::SupportHandler;

use std::sync::Arc;

use tether_proto::numeric;

use crate::Connection;
use crate::connection::Session;
use crate::dispatch::{SubscriptionId, WILDCARD};

/// Register the built-in handlers on `session`.
///
/// Returns the event bus subscriptions that must be dropped when the
/// session ends.
pub(crate) fn install(conn: &Connection, session: &Session) -> Vec<SubscriptionId> {
    let handlers = &session.handlers;

    handlers.register_inbound("ERROR", Arc::new(ErrorHandler::new(session.lifecycle.clone())));
    handlers.register_inbound("PING", Arc::new(PingHandler::new(session.outbox.clone())));

    let registration = Arc::new(RegistrationHandler);
    for verb in [
        numeric::RPL_WELCOME,
        registration::RPL_ENDOFMOTD,
        registration::ERR_NOMOTD,
    ] {
        handlers.register_inbound(verb, registration.clone());
    }
    handlers.register_inbound(numeric::RPL_WELCOME, session.bucket.clone());

    handlers.register_inbound("CAP", session.caps.clone());
    handlers.register_inbound(numeric::RPL_WELCOME, session.caps.clone());

    for verb in [
        "NICK",
        numeric::RPL_WELCOME,
        numeric::ERR_ERRONEUSNICKNAME,
        numeric::ERR_NICKNAMEINUSE,
        numeric::ERR_NICKCOLLISION,
    ] {
        handlers.register_inbound(verb, session.nick.clone());
    }

    handlers.register_inbound(numeric::RPL_ISUPPORT, session.support.clone());

    let debug = Arc::new(DebugHandler);
    handlers.register_inbound(WILDCARD, debug.clone());
    handlers.register_outbound(debug);

    vec![session.sasl.register(conn, handlers)]
}
