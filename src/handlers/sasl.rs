//! SASL PLAIN authentication.
//!
//! Starts when the cap-add topic reports `sasl`, answers the server's empty
//! challenge with the chunked credentials, and reports completion through
//! a [`SaslSignal`] that capability negotiation waits on before `CAP END`.
//!
//! Only 903 (success) and 904 (failure) complete the exchange. The other
//! SASL numerics are logged; if the server ends the exchange with one of
//! those, negotiation proceeds after its SASL timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_proto::sasl::{SASL_EMPTY, parse_mechanisms};
use tether_proto::{Capability, Message, SaslMechanism, chunk_response, encode_plain, numeric};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::Connection;
use crate::connection::{Outbox, SaslCredentials};
use crate::dispatch::{Dispatcher, InboundHandler, Subscriber, SubscriptionId};

/// One-shot completion flag with a buffered wake-up.
#[derive(Debug, Default)]
pub struct SaslSignal {
    done: AtomicBool,
    notify: Notify,
}

impl SaslSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for [`Self::finish`]. Returns whether it happened.
    pub async fn wait(&self, timeout: Duration) -> bool {
        if self.is_finished() {
            return true;
        }
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
            || self.is_finished()
    }
}

#[derive(Debug, Default)]
struct SaslState {
    started: bool,
    awaiting_challenge: bool,
    mechanisms: Vec<SaslMechanism>,
}

/// Per-session SASL PLAIN client.
pub struct SaslHandler {
    outbox: Outbox,
    credentials: Option<SaslCredentials>,
    signal: Arc<SaslSignal>,
    state: Mutex<SaslState>,
}

impl SaslHandler {
    pub fn new(
        outbox: Outbox,
        credentials: Option<SaslCredentials>,
        signal: Arc<SaslSignal>,
    ) -> Self {
        Self {
            outbox,
            credentials,
            signal,
            state: Mutex::new(SaslState::default()),
        }
    }

    pub fn signal(&self) -> &Arc<SaslSignal> {
        &self.signal
    }

    /// Mechanisms reported by 908, if any.
    pub fn server_mechanisms(&self) -> Vec<SaslMechanism> {
        self.state.lock().mechanisms.clone()
    }

    /// Hook into a session: AUTHENTICATE and SASL numerics, plus the cap-add
    /// topic. The returned subscription must be dropped with the session.
    pub fn register(self: &Arc<Self>, conn: &Connection, handlers: &Dispatcher) -> SubscriptionId {
        handlers.register_inbound("AUTHENTICATE", self.clone());
        for verb in numeric::SASL_NUMERICS {
            handlers.register_inbound(verb, self.clone());
        }
        conn.events().capability_added().subscribe(self.clone())
    }

    async fn respond(&self, payload: Option<&str>) {
        if payload != Some(SASL_EMPTY) {
            debug!(?payload, "Ignoring unexpected AUTHENTICATE payload");
            return;
        }
        let credentials = {
            let mut state = self.state.lock();
            if !state.awaiting_challenge {
                return;
            }
            state.awaiting_challenge = false;
            self.credentials.clone()
        };
        let Some(credentials) = credentials else { return };

        let encoded = encode_plain(&credentials.username, &credentials.password);
        for chunk in chunk_response(&encoded) {
            if let Err(e) = self.outbox.send(format!("AUTHENTICATE {}", chunk)).await {
                warn!(error = %e, "Failed to send SASL response");
                self.signal.finish();
                return;
            }
        }
    }
}

#[async_trait]
impl Subscriber<Capability> for SaslHandler {
    async fn notify(&self, _conn: Connection, cap: Arc<Capability>) {
        if cap.name != "sasl" {
            return;
        }
        // No advertised list (pre-302 servers) means PLAIN is worth trying.
        let plain_offered =
            cap.value.is_empty() || parse_mechanisms(&cap.value).contains(&SaslMechanism::Plain);

        let start = {
            let mut state = self.state.lock();
            if state.started {
                return;
            }
            state.started = true;
            let start = self.credentials.is_some() && plain_offered;
            state.awaiting_challenge = start;
            start
        };

        if !start {
            if self.credentials.is_none() {
                debug!("SASL not configured, skipping authentication");
            } else {
                warn!(mechanisms = %cap.value, "Server does not offer SASL PLAIN");
            }
            self.signal.finish();
            return;
        }

        info!("Starting SASL PLAIN authentication");
        if let Err(e) = self.outbox.send("AUTHENTICATE PLAIN").await {
            warn!(error = %e, "Failed to start SASL");
            self.signal.finish();
        }
    }
}

#[async_trait]
impl InboundHandler for SaslHandler {
    async fn handle(&self, _conn: Connection, msg: Arc<Message>) {
        match msg.verb.as_str() {
            "AUTHENTICATE" => self.respond(msg.param(0)).await,
            numeric::RPL_SASLSUCCESS => {
                info!("SASL authentication successful");
                self.signal.finish();
            }
            numeric::ERR_SASLFAIL => {
                warn!(reason = msg.trailing().unwrap_or_default(), "SASL authentication failed");
                self.signal.finish();
            }
            numeric::RPL_LOGGEDIN => {
                info!(account = msg.param(2).unwrap_or_default(), "Logged in");
            }
            numeric::RPL_LOGGEDOUT => info!("Logged out"),
            numeric::ERR_NICKLOCKED
            | numeric::ERR_SASLTOOLONG
            | numeric::ERR_SASLABORTED
            | numeric::ERR_SASLALREADY => {
                warn!(
                    numeric = %msg.verb,
                    reason = msg.trailing().unwrap_or_default(),
                    "SASL exchange did not complete"
                );
            }
            numeric::RPL_SASLMECHS => {
                let mechanisms = parse_mechanisms(msg.param(1).unwrap_or_default());
                debug!(?mechanisms, "Server SASL mechanisms");
                self.state.lock().mechanisms = mechanisms;
            }
            _ => {}
        }
    }
}
