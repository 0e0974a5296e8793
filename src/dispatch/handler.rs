//! Handler traits and closure adapters.
//!
//! Handlers receive owned arguments (a cheap [`Connection`] clone and an
//! `Arc` of the payload) because every invocation runs on its own task.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tether_proto::Message;

use crate::Connection;

/// Which way a raw line travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// An unparsed line as read from or written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub direction: Direction,
    /// Line text including its terminator.
    pub line: String,
}

/// Handles parsed inbound messages for one verb (or `*`).
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    async fn handle(&self, conn: Connection, msg: Arc<Message>);
}

/// Observes every outbound line before it is written.
#[async_trait]
pub trait OutboundHandler: Send + Sync + 'static {
    async fn handle(&self, conn: Connection, line: Arc<str>);
}

/// Observes every raw line in both directions.
#[async_trait]
pub trait RawHandler: Send + Sync + 'static {
    async fn handle(&self, conn: Connection, raw: Arc<RawLine>);
}

/// Receives events published on an [`crate::EventBus`] topic.
#[async_trait]
pub trait Subscriber<E: Send + Sync + 'static>: Send + Sync + 'static {
    async fn notify(&self, conn: Connection, event: Arc<E>);
}

/// Adapts an async closure to one of the handler traits.
///
/// Built by the `add_*_handler` helpers on [`Connection`], which pin down
/// the closure's argument types.
pub struct FnHandler<F>(pub(crate) F);

#[async_trait]
impl<F, Fut> InboundHandler for FnHandler<F>
where
    F: Fn(Connection, Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, conn: Connection, msg: Arc<Message>) {
        (self.0)(conn, msg).await
    }
}

#[async_trait]
impl<F, Fut> OutboundHandler for FnHandler<F>
where
    F: Fn(Connection, Arc<str>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, conn: Connection, line: Arc<str>) {
        (self.0)(conn, line).await
    }
}

#[async_trait]
impl<F, Fut> RawHandler for FnHandler<F>
where
    F: Fn(Connection, Arc<RawLine>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, conn: Connection, raw: Arc<RawLine>) {
        (self.0)(conn, raw).await
    }
}

#[async_trait]
impl<E, F, Fut> Subscriber<E> for FnHandler<F>
where
    E: Send + Sync + 'static,
    F: Fn(Connection, Arc<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn notify(&self, conn: Connection, event: Arc<E>) {
        (self.0)(conn, event).await
    }
}

/// Wrap an inbound closure.
pub fn inbound_fn<F, Fut>(f: F) -> Arc<dyn InboundHandler>
where
    F: Fn(Connection, Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Wrap an outbound closure.
pub fn outbound_fn<F, Fut>(f: F) -> Arc<dyn OutboundHandler>
where
    F: Fn(Connection, Arc<str>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Wrap a raw-line closure.
pub fn raw_fn<F, Fut>(f: F) -> Arc<dyn RawHandler>
where
    F: Fn(Connection, Arc<RawLine>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Wrap an event subscriber closure.
pub fn subscriber_fn<E, F, Fut>(f: F) -> Arc<dyn Subscriber<E>>
where
    E: Send + Sync + 'static,
    F: Fn(Connection, Arc<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
