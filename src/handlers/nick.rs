//! Nickname tracking and recovery.
//!
//! Keeps the connection registered when the preferred nickname is taken or
//! invalid, and periodically tries to win the preferred nickname back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tether_proto::{Message, numeric};
use tracing::{debug, info, warn};

use crate::Connection;
use crate::connection::Outbox;
use crate::dispatch::InboundHandler;

const RANDOM_NICK_LEN: usize = 8;
const NICK_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug)]
struct NickState {
    current: String,
    /// A reclaim attempt for the preferred nickname is in flight.
    probing: bool,
}

/// Handles NICK, 001, 432, 433 and 436.
pub struct NickHandler {
    outbox: Outbox,
    preferred: String,
    state: Mutex<NickState>,
}

impl NickHandler {
    pub fn new(outbox: Outbox, preferred: impl Into<String>) -> Self {
        let preferred = preferred.into();
        Self {
            outbox,
            state: Mutex::new(NickState {
                current: preferred.clone(),
                probing: false,
            }),
            preferred,
        }
    }

    pub fn preferred(&self) -> &str {
        &self.preferred
    }

    pub fn current(&self) -> String {
        self.state.lock().current.clone()
    }

    pub fn is_probing(&self) -> bool {
        self.state.lock().probing
    }

    async fn request(&self, nick: String) {
        self.state.lock().current = nick.clone();
        if let Err(e) = self.outbox.send(format!("NICK {}", nick)).await {
            warn!(error = %e, %nick, "Failed to send NICK");
        }
    }

    async fn on_nick(&self, msg: &Message) {
        let Some(new) = msg.param(0) else { return };
        let source = msg.source_nick();
        let reclaim = {
            let mut state = self.state.lock();
            if source.eq_ignore_ascii_case(&state.current) {
                info!(from = source, to = new, "Nickname changed");
                state.current = new.to_string();
                state.probing = false;
                false
            } else {
                source.eq_ignore_ascii_case(&self.preferred)
            }
        };
        if reclaim {
            info!(nick = %self.preferred, "Preferred nickname released, reclaiming");
            if let Err(e) = self.outbox.send(format!("NICK {}", self.preferred)).await {
                warn!(error = %e, "Failed to reclaim nickname");
            }
        }
    }

    async fn on_in_use(&self) {
        let fallback = {
            let mut state = self.state.lock();
            if state.probing {
                debug!("Preferred nickname still taken");
                state.probing = false;
                None
            } else {
                Some(format!("{}{}", state.current, rand::thread_rng().gen_range(0..10)))
            }
        };
        if let Some(nick) = fallback {
            info!(%nick, "Nickname in use, trying fallback");
            self.request(nick).await;
        }
    }

    /// Periodically try to get the preferred nickname back. A zero period
    /// disables the monitor.
    pub async fn run_monitor(self: Arc<Self>, period: Duration) {
        if period.is_zero() {
            warn!("Nickname monitor disabled: zero probe interval");
            return;
        }
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let probe = {
                let mut state = self.state.lock();
                let probe = !state.current.eq_ignore_ascii_case(&self.preferred);
                if probe {
                    state.probing = true;
                }
                probe
            };
            if probe {
                debug!(nick = %self.preferred, "Probing preferred nickname");
                if let Err(e) = self.outbox.send(format!("NICK {}", self.preferred)).await {
                    debug!(error = %e, "Nickname monitor stopping");
                    return;
                }
            }
        }
    }
}

/// Random nickname of ASCII letters.
pub fn random_nick() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_NICK_LEN)
        .map(|_| NICK_LETTERS[rng.gen_range(0..NICK_LETTERS.len())] as char)
        .collect()
}

#[async_trait]
impl InboundHandler for NickHandler {
    async fn handle(&self, _conn: Connection, msg: Arc<Message>) {
        match msg.verb.as_str() {
            "NICK" => self.on_nick(&msg).await,
            numeric::RPL_WELCOME => {
                // The server tells us who we are.
                if let Some(nick) = msg.param(0) {
                    self.state.lock().current = nick.to_string();
                }
            }
            numeric::ERR_ERRONEUSNICKNAME => {
                let nick = random_nick();
                warn!(rejected = msg.param(1).unwrap_or_default(), %nick, "Erroneous nickname");
                self.request(nick).await;
            }
            numeric::ERR_NICKNAMEINUSE | numeric::ERR_NICKCOLLISION => self.on_in_use().await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{detached, outbox};
    use std::collections::HashSet;

    fn msg(line: &str) -> Arc<Message> {
        Arc::new(Message::parse(line, "irc.test").unwrap())
    }

    #[test]
    fn test_random_nick_shape() {
        let nicks: HashSet<String> = (0..50).map(|_| random_nick()).collect();
        for nick in &nicks {
            assert_eq!(nick.len(), 8);
            assert!(nick.chars().all(|c| c.is_ascii_alphabetic()));
        }
        assert!(nicks.len() > 1, "every draw was {nicks:?}");
    }

    #[tokio::test]
    async fn test_in_use_appends_digit() {
        let (conn, mut rx) = detached();
        let handler = NickHandler::new(outbox(&conn), "ferris");
        handler
            .handle(conn, msg(":irc.test 433 * ferris :Nickname is already in use"))
            .await;

        let sent = rx.recv().await.unwrap();
        let nick = sent.strip_prefix("NICK ").unwrap().trim_end();
        assert_eq!(nick.len(), "ferris".len() + 1);
        assert!(nick.starts_with("ferris"));
        assert!(nick.chars().last().unwrap().is_ascii_digit());
        assert_eq!(handler.current(), nick);
    }

    #[tokio::test]
    async fn test_in_use_while_probing_only_clears_flag() {
        let (conn, mut rx) = detached();
        let handler = NickHandler::new(outbox(&conn), "ferris");
        {
            let mut state = handler.state.lock();
            state.current = "ferris3".into();
            state.probing = true;
        }
        handler
            .handle(conn, msg(":irc.test 433 ferris3 ferris :Nickname is already in use"))
            .await;
        assert!(!handler.is_probing());
        assert_eq!(handler.current(), "ferris3");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_erroneous_nick_picks_random() {
        let (conn, mut rx) = detached();
        let handler = NickHandler::new(outbox(&conn), "f*rris");
        let mut nicks = HashSet::new();
        for _ in 0..50 {
            handler
                .handle(conn.clone(), msg(":irc.test 432 * f*rris :Erroneous Nickname"))
                .await;
            let sent = rx.recv().await.unwrap();
            let nick = sent.strip_prefix("NICK ").unwrap().trim_end().to_string();
            assert_eq!(nick.len(), 8);
            assert!(nick.chars().all(|c| c.is_ascii_alphabetic()));
            assert_eq!(handler.current(), nick);
            nicks.insert(nick);
        }
        assert!(nicks.len() > 1, "every replacement was {nicks:?}");
    }

    #[tokio::test]
    async fn test_own_nick_change_is_tracked() {
        let (conn, mut rx) = detached();
        let handler = NickHandler::new(outbox(&conn), "ferris");
        handler.handle(conn, msg(":ferris!u@h NICK :crab")).await;
        assert_eq!(handler.current(), "crab");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_preferred_released_triggers_reclaim() {
        let (conn, mut rx) = detached();
        let handler = NickHandler::new(outbox(&conn), "ferris");
        handler.state.lock().current = "ferris7".into();
        handler.handle(conn, msg(":ferris!u@h NICK :someone")).await;
        assert_eq!(rx.recv().await.unwrap(), "NICK ferris\r\n");
        assert_eq!(handler.current(), "ferris7");
    }

    #[tokio::test]
    async fn test_welcome_syncs_current() {
        let (conn, _rx) = detached();
        let handler = NickHandler::new(outbox(&conn), "ferris");
        handler.handle(conn, msg(":irc.test 001 ferris_ :Welcome")).await;
        assert_eq!(handler.current(), "ferris_");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_probes_preferred() {
        let (conn, mut rx) = detached();
        let handler = Arc::new(NickHandler::new(outbox(&conn), "ferris"));
        handler.state.lock().current = "ferris2".into();
        let monitor = tokio::spawn(handler.clone().run_monitor(Duration::from_secs(60)));

        assert_eq!(rx.recv().await.unwrap(), "NICK ferris\r\n");
        assert!(handler.is_probing());
        monitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_with_zero_period_returns() {
        let (conn, mut rx) = detached();
        let handler = Arc::new(NickHandler::new(outbox(&conn), "ferris"));
        handler.state.lock().current = "ferris2".into();
        handler.clone().run_monitor(Duration::ZERO).await;
        assert!(rx.try_recv().is_err());
        assert!(!handler.is_probing());
    }
}
