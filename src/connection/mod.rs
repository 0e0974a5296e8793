//! The connection engine.
//!
//! A [`Connection`] is a cheap, clonable handle. It owns the user-level
//! handler registry and the event bus, both of which persist across
//! reconnects, and at most one live session at a time.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► dial (TCP, optional TLS) ──► session loops spawned
//!           ──► CAP LS 302, [PASS], NICK, USER
//! wait()    ──► blocks until the session ends, then tears it down
//! ```

mod loops;
mod options;
mod retry;
mod session;
mod state;
mod transport;

pub use options::{
    ClientConfig, ConnectionOptions, DEFAULT_DIAL_TIMEOUT, DEFAULT_KEEPALIVE,
    DEFAULT_NICK_PROBE_INTERVAL, DEFAULT_QUIT_GRACE, DEFAULT_SASL_TIMEOUT, DEFAULT_WANTED_CAPS,
    SaslCredentials,
};
pub use retry::{MAX_RETRY_DELAY_SECS, retry_delay};
pub use state::ConnectionState;

pub use session::Outbox;

pub(crate) use session::{Lifecycle, Session, SessionEnd};

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_proto::{Capability, Message};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info};

use crate::dispatch::{
    Dispatcher, EventBus, InboundHandler, OutboundHandler, RawHandler, RawLine, inbound_fn,
    outbound_fn, raw_fn,
};
use crate::error::{ConnectionError, ConnectionResult};
use crate::flood::{RateLimitedWriter, run_refill};
use crate::telemetry::spans;
use transport::Transport;

struct Inner {
    client: ClientConfig,
    options: ConnectionOptions,
    /// User handlers; persist across sessions.
    handlers: Dispatcher,
    events: EventBus,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Arc<Session>>>,
    ended: Mutex<Option<mpsc::Receiver<SessionEnd>>>,
}

/// Handle to one IRC client connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn new(client: ClientConfig, options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                options,
                handlers: Dispatcher::new(),
                events: EventBus::new(),
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                ended: Mutex::new(None),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn client(&self) -> &ClientConfig {
        &self.inner.client
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// User-level handler registry.
    pub fn handlers(&self) -> &Dispatcher {
        &self.inner.handlers
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.lock().clone()
    }

    /// Our nickname as the server knows it, while connected.
    pub fn current_nickname(&self) -> Option<String> {
        self.session().map(|s| s.nick.current())
    }

    /// Value of an ISUPPORT key. Bare keys yield `Some("")`.
    pub fn isupport(&self, key: &str) -> Option<String> {
        self.session()?.support.get(key)
    }

    /// Capabilities known in the current session.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.session()
            .map(|s| s.caps.capabilities())
            .unwrap_or_default()
    }

    /// Whether `name` is enabled in the current session.
    pub fn has_capability(&self, name: &str) -> bool {
        self.session()
            .and_then(|s| s.caps.capability(name))
            .is_some_and(|c| c.is_enabled())
    }

    // ========================================================================
    // Handler registration
    // ========================================================================

    /// Run `handler` for every inbound message with `verb` (`*` for all).
    pub fn add_inbound_handler<F, Fut>(&self, verb: &str, handler: F)
    where
        F: Fn(Connection, Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.register_inbound(verb, inbound_fn(handler));
    }

    /// Register several inbound handlers at once.
    pub fn add_inbound_handlers<I, S>(&self, handlers: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn InboundHandler>)>,
        S: AsRef<str>,
    {
        for (verb, handler) in handlers {
            self.inner.handlers.register_inbound(verb.as_ref(), handler);
        }
    }

    /// Run `handler` for every line we send.
    pub fn add_outbound_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Connection, Arc<str>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.register_outbound(outbound_fn(handler));
    }

    pub fn add_outbound_handlers<I>(&self, handlers: I)
    where
        I: IntoIterator<Item = Arc<dyn OutboundHandler>>,
    {
        for handler in handlers {
            self.inner.handlers.register_outbound(handler);
        }
    }

    /// Run `handler` for every raw line in either direction.
    pub fn add_raw_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Connection, Arc<RawLine>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.register_raw(raw_fn(handler));
    }

    pub fn add_raw_handlers<I>(&self, handlers: I)
    where
        I: IntoIterator<Item = Arc<dyn RawHandler>>,
    {
        for handler in handlers {
            self.inner.handlers.register_raw(handler);
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queue a line for the server. CRLF is appended.
    ///
    /// Waits while the outbound queue is full.
    pub async fn send_raw(&self, line: impl Into<String>) -> ConnectionResult {
        let session = self.session().ok_or(ConnectionError::NotConnected)?;
        session.send_line(line.into()).await
    }

    /// Ask the session to QUIT. Ends after the quit grace period.
    pub fn quit(&self) {
        match self.session() {
            Some(session) => {
                let _ = session.quit.try_send(());
            }
            None => debug!("quit() without a session"),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Dial the configured server and start a session.
    pub async fn connect(&self) -> ConnectionResult {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }
        info!(server = %self.inner.client.server, tls = self.inner.client.tls, "Connecting");
        self.set_state(ConnectionState::Connecting);

        match transport::dial(&self.inner.client, self.inner.options.dial_timeout).await {
            Ok(Transport::Plain(tcp)) => self.connect_with_stream(tcp).await,
            Ok(Transport::Tls(tls)) => self.connect_with_stream(*tls).await,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Start a session over an already established stream.
    pub async fn connect_with_stream<S>(&self, stream: S) -> ConnectionResult
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (session, channels) = {
            let mut current = self.inner.session.lock();
            if current.is_some() {
                return Err(ConnectionError::AlreadyConnected);
            }
            let (session, channels) = Session::new(self, &self.inner.options);
            *current = Some(session.clone());
            (session, channels)
        };
        *self.inner.ended.lock() = Some(channels.ended);
        self.set_state(ConnectionState::Handshaking);

        let span = spans::session(&self.inner.client.server, &self.inner.client.nickname);
        let (reader, writer) = tokio::io::split(stream);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let writer = RateLimitedWriter::new(writer, session.bucket.clone());

        session.track(tokio::spawn(
            loops::read_loop(self.clone(), session.clone(), reader, errors_tx.clone())
                .instrument(span.clone()),
        ));
        session.track(tokio::spawn(
            loops::write_loop(
                self.clone(),
                session.clone(),
                channels.outbound,
                writer,
                errors_tx,
            )
            .instrument(span.clone()),
        ));
        session.track(tokio::spawn(
            loops::misc_loop(self.clone(), session.clone(), errors_rx, channels.quit)
                .instrument(span.clone()),
        ));
        session.track(tokio::spawn(run_refill(session.bucket.clone())));
        session.track(tokio::spawn(
            session
                .nick
                .clone()
                .run_monitor(self.inner.options.nick_probe_interval)
                .instrument(span),
        ));

        if let Err(e) = self.register(&session).await {
            self.teardown();
            return Err(e);
        }
        Ok(())
    }

    /// Open capability negotiation and send our identity.
    async fn register(&self, session: &Session) -> ConnectionResult {
        session.caps.begin().await?;
        let client = &self.inner.client;
        if let Some(password) = client.password.as_deref().filter(|p| !p.is_empty()) {
            session.send_line(format!("PASS {}", password)).await?;
        }
        session.send_line(format!("NICK {}", client.nickname)).await?;
        session
            .send_line(format!("USER {} 0 * :{}", client.username, client.realname))
            .await
    }

    /// Block until the current session ends, then tear it down.
    ///
    /// `Ok` means the session ended by quitting; transport failures and
    /// server ERROR come back as errors.
    pub async fn wait(&self) -> ConnectionResult {
        let ended = self.inner.ended.lock().take();
        let Some(mut ended) = ended else {
            return Err(ConnectionError::NotConnected);
        };
        let end = ended.recv().await;
        self.teardown();
        match end {
            Some(SessionEnd::Failed(e)) => Err(e),
            Some(SessionEnd::Quit) | None => Ok(()),
        }
    }

    pub async fn connect_and_wait(&self) -> ConnectionResult {
        self.connect().await?;
        self.wait().await
    }

    fn teardown(&self) {
        self.inner.ended.lock().take();
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.shutdown(self);
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected");
    }

    // ========================================================================
    // Internal plumbing
    // ========================================================================

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut current = self.inner.state.lock();
        if *current != state {
            debug!(from = %*current, to = %state, "State change");
            *current = state;
        }
    }

    pub(crate) fn mark_registered(&self) {
        let mut current = self.inner.state.lock();
        if *current == ConnectionState::Handshaking {
            *current = ConnectionState::Registered;
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut current = self.inner.state.lock();
        if matches!(*current, ConnectionState::Handshaking | ConnectionState::Registered) {
            *current = ConnectionState::Running;
        }
    }

    pub(crate) fn dispatch_inbound(&self, session: &Session, msg: Arc<Message>) {
        session.handlers.dispatch_inbound(self, &msg);
        self.inner.handlers.dispatch_inbound(self, &msg);
    }

    pub(crate) fn dispatch_outbound(&self, session: &Session, line: &Arc<str>) {
        session.handlers.dispatch_outbound(self, line);
        self.inner.handlers.dispatch_outbound(self, line);
    }

    pub(crate) fn dispatch_raw(&self, session: &Session, raw: &Arc<RawLine>) {
        session.handlers.dispatch_raw(self, raw);
        self.inner.handlers.dispatch_raw(self, raw);
    }
}

/// Format a line and send it with [`Connection::send_raw`].
///
/// ```ignore
/// send_rawf!(conn, "PRIVMSG {} :{}", target, text).await?;
/// ```
#[macro_export]
macro_rules! send_rawf {
    ($conn:expr, $($arg:tt)*) => {
        $conn.send_raw(::std::format!($($arg)*))
    };
}


#[cfg(test)]
mod tests {
    use super::*;
    use testing::detached;

    #[tokio::test]
    async fn test_send_raw_appends_crlf() {
        let (conn, mut rx) = detached();
        conn.send_raw("PRIVMSG #a :hi").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "PRIVMSG #a :hi\r\n");

        conn.send_raw("PING x\r\n").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "PING x\r\n");
    }

    #[tokio::test]
    async fn test_send_rawf_formats() {
        let (conn, mut rx) = detached();
        send_rawf!(conn, "JOIN {}", "#rust").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "JOIN #rust\r\n");
    }

    #[tokio::test]
    async fn test_send_raw_rejects_embedded_newline() {
        let (conn, _rx) = detached();
        let err = conn.send_raw("PRIVMSG #a :x\r\nQUIT").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_send_raw_without_session() {
        let conn = Connection::new(
            ClientConfig::new("irc.test", "tester"),
            ConnectionOptions::default(),
        );
        assert!(matches!(
            conn.send_raw("PING x").await,
            Err(ConnectionError::NotConnected)
        ));
        assert!(matches!(conn.wait().await, Err(ConnectionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_user_handlers_survive_teardown() {
        let (conn, _rx) = detached();
        conn.add_inbound_handler("PRIVMSG", |_conn, _msg| async {});
        conn.add_outbound_handler(|_conn, _line| async {});
        conn.teardown();
        assert!(!conn.is_connected());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.handlers().handler_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_end_after_teardown_stays_with_old_session() {
        use crate::dispatch::InboundHandler;
        use std::time::Duration;

        let msg = |line: &str| Arc::new(Message::parse(line, "irc.test").unwrap());
        let (conn, mut first_rx) = detached();
        let first = conn.session().unwrap();
        first
            .caps
            .handle(conn.clone(), msg(":irc.test CAP * LS :sasl"))
            .await;
        assert_eq!(first_rx.recv().await.unwrap(), "CAP REQ :sasl\r\n");

        // ACK sasl: negotiation now waits for SASL before CAP END.
        let pending = tokio::spawn({
            let caps = first.caps.clone();
            let conn = conn.clone();
            async move { caps.handle(conn, msg(":irc.test CAP * ACK :sasl")).await }
        });
        tokio::task::yield_now().await;

        conn.teardown();
        drop(first_rx);
        let (second, channels) = Session::new(&conn, conn.options());
        *conn.inner.session.lock() = Some(second);
        let mut second_rx = channels.outbound;

        tokio::time::sleep(conn.options().sasl_timeout + Duration::from_secs(1)).await;
        pending.await.unwrap();
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_state_milestones() {
        let (conn, _rx) = detached();
        conn.mark_running();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.set_state(ConnectionState::Handshaking);
        conn.mark_registered();
        assert_eq!(conn.state(), ConnectionState::Registered);
        conn.mark_running();
        assert_eq!(conn.state(), ConnectionState::Running);

        conn.set_state(ConnectionState::Quitting);
        conn.mark_running();
        assert_eq!(conn.state(), ConnectionState::Quitting);
    }
}
