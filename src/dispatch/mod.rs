//! Handler registration, dispatch and the event bus.
//!
//! - [`handler`]: handler traits and closure adapters
//! - [`registry`]: the verb-keyed [`Dispatcher`]
//! - [`events`]: the topic-based [`EventBus`]
//!
//! Every handler invocation runs on its own task. A panicking handler is
//! logged and contained; it never takes down the connection or its peers.

mod events;
mod handler;
mod registry;

pub use events::{ChannelPart, EventBus, SubscriptionId, Topic};
pub use handler::{
    Direction, FnHandler, InboundHandler, OutboundHandler, RawHandler, RawLine, Subscriber,
    inbound_fn, outbound_fn, raw_fn, subscriber_fn,
};
pub use registry::{Dispatcher, WILDCARD};

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

/// Run `fut` on its own task, logging instead of propagating a panic.
pub(crate) fn spawn_contained<F>(kind: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            error!(kind, panic = panic_message(&*panic), "Handler panicked");
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
