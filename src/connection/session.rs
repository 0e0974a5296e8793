//! One connected session: channels, built-in handlers and task handles.
//!
//! A [`Connection`] creates a fresh `Session` on every connect. Everything
//! here dies with the socket; user handlers and the event bus live on the
//! connection and survive reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tether_proto::ProtocolError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::{Connection, ConnectionOptions};
use crate::dispatch::{Dispatcher, SubscriptionId};
use crate::error::{ConnectionError, ConnectionResult};
use crate::flood::TokenBucket;
use crate::handlers::{CapabilityHandler, NickHandler, SaslHandler, SaslSignal, SupportHandler};

/// Outbound queue depth. Senders wait when the writer falls behind.
pub(crate) const OUTBOUND_QUEUE: usize = 10;

/// Why a session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// We quit on purpose (user request or signal).
    Quit,
    Failed(ConnectionError),
}

/// Completion latch for one session.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    ended: mpsc::Sender<SessionEnd>,
    quitting: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new() -> (Arc<Self>, mpsc::Receiver<SessionEnd>) {
        let (ended, rx) = mpsc::channel(1);
        let lifecycle = Arc::new(Self {
            ended,
            quitting: AtomicBool::new(false),
        });
        (lifecycle, rx)
    }

    /// Mark the session as quitting. Returns `false` if it already was.
    pub(crate) fn begin_quit(&self) -> bool {
        !self.quitting.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::Acquire)
    }

    /// End the session because of `err`. While quitting, the server
    /// closing on us is the expected outcome and counts as a clean end.
    pub(crate) fn fail(&self, err: ConnectionError) {
        if self.is_quitting() {
            debug!(error = %err, "Connection ended while quitting");
            self.end(SessionEnd::Quit);
        } else {
            self.end(SessionEnd::Failed(err));
        }
    }

    /// First caller wins; later ends are dropped.
    pub(crate) fn end(&self, end: SessionEnd) {
        if self.ended.try_send(end).is_err() {
            debug!("Session already ending");
        }
    }
}

/// Sending half of one session's outbound queue.
///
/// Built-in handlers hold the outbox of the session that created them, so
/// a late send from a torn-down session fails with
/// [`ConnectionError::NotConnected`] instead of reaching its successor.
#[derive(Debug, Clone)]
pub struct Outbox(mpsc::Sender<String>);

impl Outbox {
    /// Queue one line, terminating it with CRLF.
    ///
    /// Waits while the outbound queue is full. Lines with embedded breaks
    /// are rejected.
    pub async fn send(&self, line: impl Into<String>) -> ConnectionResult {
        let mut line = line.into();
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        if line.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedNewline.into());
        }
        line.push_str("\r\n");
        self.0
            .send(line)
            .await
            .map_err(|_| ConnectionError::NotConnected)
    }
}

pub(crate) struct Session {
    pub(crate) outbox: Outbox,
    pub(crate) quit: mpsc::Sender<()>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    /// Built-in handlers for this session only.
    pub(crate) handlers: Dispatcher,
    pub(crate) bucket: Arc<TokenBucket>,
    pub(crate) caps: Arc<CapabilityHandler>,
    pub(crate) nick: Arc<NickHandler>,
    pub(crate) support: Arc<SupportHandler>,
    pub(crate) sasl: Arc<SaslHandler>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    last_activity: Mutex<Instant>,
}

/// Receiving ends handed to the session loops.
pub(crate) struct SessionChannels {
    pub(crate) outbound: mpsc::Receiver<String>,
    pub(crate) quit: mpsc::Receiver<()>,
    pub(crate) ended: mpsc::Receiver<SessionEnd>,
}

impl Session {
    pub(crate) fn new(conn: &Connection, options: &ConnectionOptions) -> (Arc<Self>, SessionChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (quit_tx, quit_rx) = mpsc::channel(1);
        let (lifecycle, ended_rx) = Lifecycle::new();

        let outbox = Outbox(outbound_tx);
        let signal = Arc::new(SaslSignal::new());
        let session = Arc::new(Self {
            outbox: outbox.clone(),
            quit: quit_tx,
            lifecycle,
            handlers: Dispatcher::new(),
            bucket: Arc::new(TokenBucket::new(options.flood.clone())),
            caps: Arc::new(CapabilityHandler::new(
                outbox.clone(),
                options.wanted_caps.clone(),
                signal.clone(),
                options.sasl_timeout,
            )),
            nick: Arc::new(NickHandler::new(
                outbox.clone(),
                conn.client().nickname.clone(),
            )),
            support: Arc::new(SupportHandler::new()),
            sasl: Arc::new(SaslHandler::new(outbox, options.sasl.clone(), signal)),
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            last_activity: Mutex::new(Instant::now()),
        });

        let subscriptions = crate::handlers::install(conn, &session);
        session.subscriptions.lock().extend(subscriptions);

        let channels = SessionChannels {
            outbound: outbound_rx,
            quit: quit_rx,
            ended: ended_rx,
        };
        (session, channels)
    }

    pub(crate) async fn send_line(&self, line: String) -> ConnectionResult {
        self.outbox.send(line).await
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub(crate) fn track(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    /// Stop every task and drop bus subscriptions.
    pub(crate) fn shutdown(&self, conn: &Connection) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for id in self.subscriptions.lock().drain(..) {
            conn.events().capability_added().unsubscribe(id);
        }
    }
}
