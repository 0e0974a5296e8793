//! ISUPPORT (005) tracking.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tether_proto::isupport::{self, SupportToken};
use tether_proto::Message;
use tracing::trace;

use crate::Connection;
use crate::dispatch::InboundHandler;

/// Accumulates the server's advertised features in arrival order.
#[derive(Default)]
pub struct SupportHandler {
    tokens: RwLock<Vec<SupportToken>>,
}

impl SupportHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`; `Some("")` for bare keys.
    pub fn get(&self, name: &str) -> Option<String> {
        self.tokens
            .read()
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.clone())
    }

    pub fn tokens(&self) -> Vec<SupportToken> {
        self.tokens.read().clone()
    }

    /// Merge one 005 reply. Negated tokens remove by name; others upsert.
    pub fn apply(&self, params: &[String]) {
        let mut tokens = self.tokens.write();
        for token in isupport::tokenise(params) {
            if token.negated {
                tokens.retain(|t| t.name != token.name);
                continue;
            }
            match tokens.iter_mut().find(|t| t.name == token.name) {
                Some(existing) => existing.value = token.value,
                None => tokens.push(token),
            }
        }
        trace!(count = tokens.len(), "ISUPPORT updated");
    }
}

#[async_trait]
impl InboundHandler for SupportHandler {
    async fn handle(&self, _conn: Connection, msg: Arc<Message>) {
        self.apply(&msg.params);
    }
}
