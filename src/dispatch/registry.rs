//! Handler registry and concurrent dispatch.
//!
//! A `Dispatcher` holds inbound handlers keyed by verb (plus the `*`
//! wildcard), outbound handlers and raw-line handlers. Dispatch never
//! awaits a handler: each registered handler is started on its own task and
//! the call returns the number of tasks started.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tether_proto::Message;
use tracing::trace;

use super::handler::{InboundHandler, OutboundHandler, RawHandler, RawLine};
use super::spawn_contained;
use crate::Connection;

/// Verb that matches every inbound message.
pub const WILDCARD: &str = "*";

/// Registry of handlers for one scope (user-level or per-session).
///
/// Registration is internally synchronized, so handlers may be added while
/// the connection is running; additions apply to the next dispatched line.
#[derive(Default)]
pub struct Dispatcher {
    inbound: RwLock<HashMap<String, Vec<Arc<dyn InboundHandler>>>>,
    outbound: RwLock<Vec<Arc<dyn OutboundHandler>>>,
    raw: RwLock<Vec<Arc<dyn RawHandler>>>,
    /// Per-verb counts of dispatched inbound messages.
    counts: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `verb`. Verbs are matched case-insensitively.
    pub fn register_inbound(&self, verb: &str, handler: Arc<dyn InboundHandler>) {
        self.inbound
            .write()
            .entry(verb.to_ascii_uppercase())
            .or_default()
            .push(handler);
    }

    pub fn register_outbound(&self, handler: Arc<dyn OutboundHandler>) {
        self.outbound.write().push(handler);
    }

    pub fn register_raw(&self, handler: Arc<dyn RawHandler>) {
        self.raw.write().push(handler);
    }

    /// Handlers that would run for `verb`: its own, then the wildcard's.
    pub fn inbound_handlers(&self, verb: &str) -> Vec<Arc<dyn InboundHandler>> {
        let inbound = self.inbound.read();
        let verb = verb.to_ascii_uppercase();
        let own = inbound.get(&verb).into_iter().flatten();
        let wildcard = inbound.get(WILDCARD).into_iter().flatten();
        own.chain(wildcard).cloned().collect()
    }

    /// Number of registered handlers across all kinds.
    pub fn handler_count(&self) -> usize {
        let inbound: usize = self.inbound.read().values().map(Vec::len).sum();
        inbound + self.outbound.read().len() + self.raw.read().len()
    }

    /// How many messages with `verb` have been dispatched.
    pub fn dispatched(&self, verb: &str) -> u64 {
        self.counts
            .read()
            .get(&verb.to_ascii_uppercase())
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    fn count(&self, verb: &str) {
        let verb = verb.to_ascii_uppercase();
        if let Some(counter) = self.counts.read().get(&verb) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counts
            .write()
            .entry(verb)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Start every handler for `msg.verb` and the wildcard.
    pub fn dispatch_inbound(&self, conn: &Connection, msg: &Arc<Message>) -> usize {
        self.count(&msg.verb);
        let handlers = self.inbound_handlers(&msg.verb);
        trace!(verb = %msg.verb, handlers = handlers.len(), "dispatch inbound");
        for handler in &handlers {
            let handler = Arc::clone(handler);
            let conn = conn.clone();
            let msg = Arc::clone(msg);
            spawn_contained("inbound", async move { handler.handle(conn, msg).await });
        }
        handlers.len()
    }

    /// Start every outbound handler for `line`.
    pub fn dispatch_outbound(&self, conn: &Connection, line: &Arc<str>) -> usize {
        let handlers = self.outbound.read().clone();
        for handler in &handlers {
            let handler = Arc::clone(handler);
            let conn = conn.clone();
            let line = Arc::clone(line);
            spawn_contained("outbound", async move { handler.handle(conn, line).await });
        }
        handlers.len()
    }

    /// Start every raw handler for `raw`.
    pub fn dispatch_raw(&self, conn: &Connection, raw: &Arc<RawLine>) -> usize {
        let handlers = self.raw.read().clone();
        for handler in &handlers {
            let handler = Arc::clone(handler);
            let conn = conn.clone();
            let raw = Arc::clone(raw);
            spawn_contained("raw", async move { handler.handle(conn, raw).await });
        }
        handlers.len()
    }
}
