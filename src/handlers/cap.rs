//! IRCv3 capability negotiation.
//!
//! Flow for a fresh session:
//!
//! 1. `CAP LS 302` goes out before NICK/USER.
//! 2. LS replies (possibly multi-line, `*` marks continuation) are merged
//!    into the known set. On the final line every wanted capability the
//!    server offers is requested in one `CAP REQ`.
//! 3. ACK/NAK resolve the requests. ACKed capabilities are published on
//!    the cap-add topic.
//! 4. When nothing is awaiting an answer, negotiation finishes exactly once:
//!    if `sasl` was granted we give SASL a bounded time to complete, then
//!    send `CAP END`.
//!
//! `CAP NEW` and `CAP DEL` keep the set current for the rest of the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_proto::caps::CAP_LS_VERSION;
use tether_proto::{CapSubCommand, Capability, Message, numeric, parse_capability};
use tracing::{debug, info, warn};

use super::sasl::SaslSignal;
use crate::Connection;
use crate::connection::Outbox;
use crate::dispatch::InboundHandler;
use crate::error::ConnectionResult;

#[derive(Debug, Default)]
struct CapState {
    /// A multi-line LS is being received.
    listing: bool,
    /// At least one REQ has been sent.
    requested: bool,
    /// Negotiation is over (CAP END sent or registration completed).
    finished: bool,
    caps: HashMap<String, Capability>,
}

impl CapState {
    fn awaiting_any(&self) -> bool {
        self.caps.values().any(|c| c.awaiting_ack)
    }

    /// Wanted capabilities the server offers that are neither granted nor
    /// pending. Marks them as awaiting.
    fn claim_request(&mut self, wanted: &[String]) -> Vec<String> {
        let mut request = Vec::new();
        for name in wanted {
            if let Some(cap) = self.caps.get_mut(name)
                && !cap.acked
                && !cap.awaiting_ack
            {
                cap.awaiting_ack = true;
                request.push(name.clone());
            }
        }
        request
    }

    /// Mark negotiation finished if every request has been answered.
    fn try_finish(&mut self) -> bool {
        if self.finished || !self.requested || self.awaiting_any() {
            return false;
        }
        self.finished = true;
        true
    }
}

/// Per-session capability negotiator.
pub struct CapabilityHandler {
    outbox: Outbox,
    wanted: Vec<String>,
    sasl: Arc<SaslSignal>,
    sasl_timeout: Duration,
    state: Mutex<CapState>,
}

impl CapabilityHandler {
    pub fn new(
        outbox: Outbox,
        wanted: Vec<String>,
        sasl: Arc<SaslSignal>,
        sasl_timeout: Duration,
    ) -> Self {
        Self {
            outbox,
            wanted,
            sasl,
            sasl_timeout,
            state: Mutex::new(CapState::default()),
        }
    }

    /// Open negotiation.
    pub async fn begin(&self) -> ConnectionResult {
        self.outbox.send(format!("CAP LS {}", CAP_LS_VERSION)).await
    }

    /// Snapshot of every known capability, sorted by name.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<_> = self.state.lock().caps.values().cloned().collect();
        caps.sort_by(|a, b| a.name.cmp(&b.name));
        caps
    }

    pub fn capability(&self, name: &str) -> Option<Capability> {
        self.state.lock().caps.get(name).cloned()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    async fn on_listing(&self, tokens: &[&str], initial: bool) {
        let (continued, tokens) = match tokens.split_first() {
            Some((&"*", rest)) => (true, rest),
            _ => (false, tokens),
        };

        let (request, conclude) = {
            let mut state = self.state.lock();
            for token in tokens {
                let cap = parse_capability(token);
                state
                    .caps
                    .entry(cap.name.clone())
                    .and_modify(|known| known.value = cap.value.clone())
                    .or_insert(cap);
            }
            state.listing = continued;
            if continued {
                return;
            }

            let request = state.claim_request(&self.wanted);
            if !request.is_empty() {
                state.requested = true;
            }
            // Nothing we want is on offer: end negotiation right away.
            let conclude = initial && request.is_empty() && !state.finished && !state.awaiting_any();
            if conclude {
                state.finished = true;
            }
            (request, conclude)
        };

        if !request.is_empty() {
            debug!(caps = ?request, "Requesting capabilities");
            if let Err(e) = self.outbox.send(format!("CAP REQ :{}", request.join(" "))).await {
                warn!(error = %e, "Failed to send CAP REQ");
            }
        }
        if conclude {
            self.conclude().await;
        }
    }

    async fn on_ack(&self, conn: &Connection, tokens: &[&str]) {
        let (added, conclude) = {
            let mut state = self.state.lock();
            let mut added = Vec::new();
            for token in tokens {
                let (disabled, name) = match token.strip_prefix('-') {
                    Some(name) => (true, name),
                    None => (false, *token),
                };
                // Never offered: nothing to enable.
                let Some(cap) = state.caps.get_mut(name) else {
                    debug!(cap = %name, "Ignoring ACK for unknown capability");
                    continue;
                };
                cap.awaiting_ack = false;
                cap.acked = !disabled;
                if !disabled {
                    added.push(cap.clone());
                }
            }
            (added, state.try_finish())
        };

        for cap in added {
            info!(cap = %cap.name, "Capability enabled");
            conn.events().capability_added().publish(conn, cap);
        }
        if conclude {
            self.conclude().await;
        }
    }

    async fn on_nak(&self, tokens: &[&str]) {
        let conclude = {
            let mut state = self.state.lock();
            for token in tokens {
                if let Some(cap) = state.caps.get_mut(*token) {
                    cap.awaiting_ack = false;
                    cap.acked = false;
                }
            }
            state.try_finish()
        };
        warn!(caps = ?tokens, "Capabilities refused");
        if conclude {
            self.conclude().await;
        }
    }

    fn on_del(&self, conn: &Connection, tokens: &[&str]) {
        let mut removed = Vec::new();
        {
            let mut state = self.state.lock();
            for name in tokens {
                if let Some(cap) = state.caps.get_mut(*name) {
                    cap.value.clear();
                    cap.acked = false;
                    cap.awaiting_ack = false;
                    removed.push(cap.clone());
                }
            }
        }
        for cap in removed {
            info!(cap = %cap.name, "Capability withdrawn");
            conn.events().capability_removed().publish(conn, cap);
        }
    }

    /// Wait for SASL if it was granted, then end negotiation.
    async fn conclude(&self) {
        let sasl_granted = self
            .state
            .lock()
            .caps
            .get("sasl")
            .is_some_and(Capability::is_enabled);
        if sasl_granted && !self.sasl.is_finished() {
            debug!(timeout = ?self.sasl_timeout, "Waiting for SASL");
            if !self.sasl.wait(self.sasl_timeout).await {
                warn!("SASL did not finish in time, ending negotiation anyway");
            }
        }
        info!("Capability negotiation complete");
        if let Err(e) = self.outbox.send("CAP END").await {
            warn!(error = %e, "Failed to send CAP END");
        }
    }
}

#[async_trait]
impl InboundHandler for CapabilityHandler {
    async fn handle(&self, conn: Connection, msg: Arc<Message>) {
        if msg.verb == numeric::RPL_WELCOME {
            let mut state = self.state.lock();
            state.finished = true;
            state.listing = false;
            return;
        }

        // CAP <target> <subcommand> [*] [:<tokens>]
        let Some(sub) = msg.param(1) else { return };
        let rest = msg.params.get(2..).unwrap_or_default().join(" ");
        let tokens: Vec<&str> = rest.split_whitespace().collect();

        match CapSubCommand::parse(sub) {
            CapSubCommand::Ls => self.on_listing(&tokens, true).await,
            CapSubCommand::New => self.on_listing(&tokens, false).await,
            CapSubCommand::Ack => self.on_ack(&conn, &tokens).await,
            CapSubCommand::Nak => self.on_nak(&tokens).await,
            CapSubCommand::Del => self.on_del(&conn, &tokens),
            CapSubCommand::List => debug!(caps = ?tokens, "Enabled capabilities"),
            other => debug!(subcommand = %other, "Ignoring CAP subcommand"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{detached, outbox};
    use crate::dispatch::subscriber_fn;
    use tokio::sync::mpsc;

    fn wanted() -> Vec<String> {
        ["echo-message", "message-tags", "multi-prefix", "sasl"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn handler(conn: &Connection, signal: Arc<SaslSignal>) -> CapabilityHandler {
        CapabilityHandler::new(outbox(conn), wanted(), signal, Duration::from_secs(5))
    }

    fn msg(line: &str) -> Arc<Message> {
        Arc::new(Message::parse(line, "irc.test").unwrap())
    }

    #[tokio::test]
    async fn test_begin_sends_ls_302() {
        let (conn, mut rx) = detached();
        handler(&conn, Arc::new(SaslSignal::new())).begin().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "CAP LS 302\r\n");
    }

    #[tokio::test]
    async fn test_ls_requests_offered_wanted_caps() {
        let (conn, mut rx) = detached();
        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn, msg(":irc.test CAP * LS :multi-prefix sasl=PLAIN away-notify"))
            .await;

        assert_eq!(rx.recv().await.unwrap(), "CAP REQ :multi-prefix sasl\r\n");
        assert!(caps.capability("multi-prefix").unwrap().awaiting_ack);
        assert!(!caps.capability("away-notify").unwrap().awaiting_ack);
        assert_eq!(caps.capability("sasl").unwrap().value, "PLAIN");
    }

    #[tokio::test]
    async fn test_multiline_ls_waits_for_last_line() {
        let (conn, mut rx) = detached();
        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn.clone(), msg(":irc.test CAP * LS * :echo-message away-notify"))
            .await;
        assert!(rx.try_recv().is_err());
        assert!(caps.state.lock().listing);

        caps.handle(conn, msg(":irc.test CAP * LS :message-tags")).await;
        assert_eq!(rx.recv().await.unwrap(), "CAP REQ :echo-message message-tags\r\n");
        assert!(!caps.state.lock().listing);
    }

    #[tokio::test]
    async fn test_ack_publishes_and_finishes_once() {
        let (conn, mut rx) = detached();
        let (tx, mut added) = mpsc::unbounded_channel();
        conn.events()
            .capability_added()
            .subscribe(subscriber_fn(move |_conn, cap: Arc<Capability>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(cap.name.clone());
                }
            }));

        let signal = Arc::new(SaslSignal::new());
        signal.finish();
        let caps = handler(&conn, signal);
        caps.handle(
            conn.clone(),
            msg(":irc.test CAP * LS :echo-message message-tags multi-prefix sasl"),
        )
        .await;
        rx.recv().await.unwrap();

        caps.handle(conn.clone(), msg(":irc.test CAP * ACK :echo-message message-tags"))
            .await;
        assert!(!caps.is_finished());
        caps.handle(conn.clone(), msg(":irc.test CAP * ACK :multi-prefix sasl"))
            .await;
        assert!(caps.is_finished());
        assert_eq!(rx.recv().await.unwrap(), "CAP END\r\n");

        // A repeated ACK neither re-finishes nor sends another END.
        caps.handle(conn, msg(":irc.test CAP * ACK :sasl")).await;
        assert!(rx.try_recv().is_err());

        let mut names = Vec::new();
        for _ in 0..5 {
            names.push(added.recv().await.unwrap());
        }
        names.sort();
        assert_eq!(
            names,
            vec!["echo-message", "message-tags", "multi-prefix", "sasl", "sasl"]
        );
        assert!(caps.capabilities().iter().all(|c| c.is_enabled()));
    }

    #[tokio::test]
    async fn test_ack_for_unknown_cap_is_ignored() {
        let (conn, mut rx) = detached();
        let (tx, mut added) = mpsc::unbounded_channel();
        conn.events()
            .capability_added()
            .subscribe(subscriber_fn(move |_conn, cap: Arc<Capability>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(cap.name.clone());
                }
            }));

        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn.clone(), msg(":irc.test CAP * LS :multi-prefix")).await;
        assert_eq!(rx.recv().await.unwrap(), "CAP REQ :multi-prefix\r\n");

        caps.handle(conn.clone(), msg(":irc.test CAP * ACK :away-notify")).await;
        assert!(caps.capability("away-notify").is_none());
        assert!(!caps.is_finished());

        caps.handle(conn, msg(":irc.test CAP * ACK :multi-prefix")).await;
        assert_eq!(rx.recv().await.unwrap(), "CAP END\r\n");
        assert_eq!(added.recv().await.unwrap(), "multi-prefix");
        assert!(added.try_recv().is_err());
        assert_eq!(caps.capabilities().len(), 1);
    }

    #[tokio::test]
    async fn test_nak_clears_awaiting_and_ends() {
        let (conn, mut rx) = detached();
        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn.clone(), msg(":irc.test CAP * LS :multi-prefix echo-message"))
            .await;
        rx.recv().await.unwrap();

        caps.handle(conn, msg(":irc.test CAP * NAK :echo-message multi-prefix"))
            .await;
        let echo = caps.capability("echo-message").unwrap();
        assert!(!echo.acked && !echo.awaiting_ack);
        assert_eq!(rx.recv().await.unwrap(), "CAP END\r\n");
    }

    #[tokio::test]
    async fn test_nothing_wanted_on_offer_ends_immediately() {
        let (conn, mut rx) = detached();
        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn, msg(":irc.test CAP * LS :away-notify chghost")).await;
        assert_eq!(rx.recv().await.unwrap(), "CAP END\r\n");
        assert!(caps.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_waits_for_sasl_signal() {
        let (conn, mut rx) = detached();
        let signal = Arc::new(SaslSignal::new());
        let caps = Arc::new(handler(&conn, signal.clone()));
        caps.handle(conn.clone(), msg(":irc.test CAP * LS :sasl")).await;
        assert_eq!(rx.recv().await.unwrap(), "CAP REQ :sasl\r\n");

        let task = tokio::spawn({
            let caps = caps.clone();
            let conn = conn.clone();
            async move { caps.handle(conn, msg(":irc.test CAP * ACK :sasl")).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        signal.finish();
        assert_eq!(rx.recv().await.unwrap(), "CAP END\r\n");
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_after_sasl_timeout() {
        let (conn, mut rx) = detached();
        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn.clone(), msg(":irc.test CAP * LS :sasl")).await;
        rx.recv().await.unwrap();

        let start = tokio::time::Instant::now();
        caps.handle(conn, msg(":irc.test CAP * ACK :sasl")).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(rx.recv().await.unwrap(), "CAP END\r\n");
    }

    #[tokio::test]
    async fn test_new_and_del() {
        let (conn, mut rx) = detached();
        let (tx, mut removed) = mpsc::unbounded_channel();
        conn.events()
            .capability_removed()
            .subscribe(subscriber_fn(move |_conn, cap: Arc<Capability>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((*cap).clone());
                }
            }));

        let caps = handler(&conn, Arc::new(SaslSignal::new()));
        caps.handle(conn.clone(), msg(":irc.test 001 me :Welcome")).await;
        caps.handle(conn.clone(), msg(":irc.test CAP me NEW :echo-message")).await;
        assert_eq!(rx.recv().await.unwrap(), "CAP REQ :echo-message\r\n");
        caps.handle(conn.clone(), msg(":irc.test CAP me ACK :echo-message")).await;
        // Already registered: no CAP END.
        assert!(rx.try_recv().is_err());

        caps.handle(conn, msg(":irc.test CAP me DEL :echo-message")).await;
        let cap = removed.recv().await.unwrap();
        assert_eq!(cap.name, "echo-message");
        assert!(!cap.acked && !cap.awaiting_ack && cap.value.is_empty());
        let known = caps.capability("echo-message").unwrap();
        assert!(!known.is_enabled());
    }
}
