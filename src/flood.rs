//! Outbound flood control.
//!
//! Every line the client writes passes through a [`TokenBucket`]. A line
//! costs one token per started [`FloodProfile::unit_bytes`] of its length,
//! capped at the bucket capacity so an oversized line can always be sent
//! eventually.
//!
//! # Architecture
//!
//! - Limiting only starts once the server has welcomed us (001). Before that
//!   the handshake goes out unthrottled.
//! - A fresh bucket starts with a reduced balance and refills faster while
//!   ramping up to full capacity, then settles on the steady refill rate.
//! - Refills happen on a fixed tick from [`run_refill`]; writers waiting for
//!   tokens poll at [`FloodProfile::poll`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_proto::Message;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::Connection;
use crate::dispatch::InboundHandler;

/// Token bucket parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodProfile {
    /// `false` disables limiting entirely.
    pub limited: bool,
    /// Bytes covered by one token.
    pub unit_bytes: usize,
    /// Maximum balance.
    pub capacity: f64,
    /// Tokens added per tick once ramp-up is over.
    pub refill: f64,
    /// Balance of a fresh bucket.
    pub ramp_start: f64,
    /// Tokens added per tick while ramping up.
    pub ramp_refill: f64,
    /// Refill period.
    pub tick: Duration,
    /// How often a blocked writer re-checks the balance.
    pub poll: Duration,
}

impl FloodProfile {
    /// No limiting.
    pub fn unlimited() -> Self {
        Self {
            limited: false,
            ..Self::restrictive()
        }
    }

    /// Conservative profile suitable for public networks.
    pub fn restrictive() -> Self {
        Self {
            limited: true,
            unit_bytes: 128,
            capacity: 4.0,
            refill: 0.4,
            ramp_start: 1.0,
            ramp_refill: 1.0,
            tick: Duration::from_secs(1),
            poll: Duration::from_millis(250),
        }
    }

    /// Look up a profile by its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "unlimited" | "none" => Some(Self::unlimited()),
            "restrictive" | "default" => Some(Self::restrictive()),
            _ => None,
        }
    }
}

impl Default for FloodProfile {
    fn default() -> Self {
        Self::restrictive()
    }
}

#[derive(Debug)]
struct BucketState {
    balance: f64,
    ramping: bool,
}

/// Shared token bucket for one session.
#[derive(Debug)]
pub struct TokenBucket {
    profile: FloodProfile,
    registered: AtomicBool,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket at its ramp-up starting balance.
    pub fn new(profile: FloodProfile) -> Self {
        let balance = profile.ramp_start.clamp(0.0, profile.capacity);
        Self {
            state: Mutex::new(BucketState {
                balance,
                ramping: balance < profile.capacity,
            }),
            registered: AtomicBool::new(false),
            profile,
        }
    }

    pub fn profile(&self) -> &FloodProfile {
        &self.profile
    }

    /// Start limiting. Called when the server welcomes us.
    pub fn mark_registered(&self) {
        if !self.registered.swap(true, Ordering::AcqRel) {
            debug!(limited = self.profile.limited, "Flood limiting engaged");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Current balance.
    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    /// Tokens a line of `len` bytes costs.
    pub fn tokens_for(&self, len: usize) -> f64 {
        let unit = self.profile.unit_bytes.max(1);
        (len.div_ceil(unit) as f64).min(self.profile.capacity)
    }

    /// Lines bypass the bucket before registration or when unlimited.
    fn is_exempt(&self) -> bool {
        !self.profile.limited || !self.is_registered()
    }

    /// Take `tokens` if the balance allows it.
    pub fn try_take(&self, tokens: f64) -> bool {
        let mut state = self.state.lock();
        if state.balance >= tokens {
            state.balance -= tokens;
            true
        } else {
            false
        }
    }

    /// Apply one refill tick, keeping the balance within `[0, capacity]`.
    pub fn refill(&self) {
        let mut state = self.state.lock();
        let step = if state.ramping {
            self.profile.ramp_refill
        } else {
            self.profile.refill
        };
        state.balance = (state.balance + step).clamp(0.0, self.profile.capacity);
        if state.ramping && state.balance >= self.profile.capacity {
            state.ramping = false;
            trace!("Flood bucket ramp-up complete");
        }
    }

    /// Wait until a line of `len` bytes may be written, then pay for it.
    pub async fn acquire(&self, len: usize) {
        if self.is_exempt() {
            return;
        }
        let tokens = self.tokens_for(len);
        while !self.try_take(tokens) {
            trace!(tokens, "Waiting for flood tokens");
            tokio::time::sleep(self.profile.poll).await;
        }
    }
}

/// Refill `bucket` every tick until the task is aborted.
pub async fn run_refill(bucket: Arc<TokenBucket>) {
    if !bucket.profile.limited {
        return;
    }
    let mut ticker = tokio::time::interval(bucket.profile.tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        bucket.refill();
    }
}

/// Registration hook: arms the bucket on RPL_WELCOME.
#[async_trait]
impl InboundHandler for TokenBucket {
    async fn handle(&self, _conn: Connection, _msg: Arc<Message>) {
        self.mark_registered();
    }
}

/// Writer that pays the bucket before every line.
pub struct RateLimitedWriter<W> {
    inner: W,
    bucket: Arc<TokenBucket>,
}

impl<W: AsyncWrite + Unpin> RateLimitedWriter<W> {
    pub fn new(inner: W, bucket: Arc<TokenBucket>) -> Self {
        Self { inner, bucket }
    }

    /// Write one complete, already-terminated line.
    pub async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.bucket.acquire(line.len()).await;
        self.inner.write_all(line).await?;
        self.inner.flush().await
    }

    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
