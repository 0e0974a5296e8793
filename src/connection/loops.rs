//! The three session loops.
//!
//! - read: frame lines, fan out raw and parsed dispatch
//! - write: drain the outbound queue through the flood limiter
//! - misc: keepalive, transport errors, quit requests and signals

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tether_proto::{LineCodec, Message};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use super::session::{Session, SessionEnd};
use super::{Connection, ConnectionState};
use crate::dispatch::{Direction, RawLine};
use crate::error::ConnectionError;
use crate::flood::RateLimitedWriter;

/// Read lines until the socket fails or closes.
pub(crate) async fn read_loop<R>(
    conn: Connection,
    session: Arc<Session>,
    reader: R,
    errors: mpsc::Sender<ConnectionError>,
) where
    R: AsyncRead + Unpin,
{
    let server_name = conn.client().server_name().to_string();
    let mut lines = FramedRead::new(reader, LineCodec::new());

    loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                let _ = errors.try_send(e.into());
                return;
            }
            None => {
                let _ = errors.try_send(ConnectionError::Closed);
                return;
            }
        };

        let discarded = lines.decoder_mut().take_discarded();
        if discarded > 0 {
            warn!(discarded, "Dropped overlong inbound lines");
        }

        session.touch();
        let raw = Arc::new(RawLine {
            direction: Direction::Inbound,
            line,
        });
        conn.dispatch_raw(&session, &raw);

        match Message::parse(&raw.line, &server_name) {
            Ok(msg) => conn.dispatch_inbound(&session, Arc::new(msg)),
            Err(e) => debug!(error = %e, line = raw.line.trim_end(), "Dropping unparseable line"),
        }
    }
}

/// Write queued lines until the queue closes or the socket fails.
pub(crate) async fn write_loop<W>(
    conn: Connection,
    session: Arc<Session>,
    mut queue: mpsc::Receiver<String>,
    mut writer: RateLimitedWriter<W>,
    errors: mpsc::Sender<ConnectionError>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = queue.recv().await {
        if line.is_empty() {
            continue;
        }
        conn.dispatch_raw(
            &session,
            &Arc::new(RawLine {
                direction: Direction::Outbound,
                line: line.clone(),
            }),
        );
        conn.dispatch_outbound(&session, &Arc::from(line.as_str()));

        if let Err(e) = writer.write_line(line.as_bytes()).await {
            let _ = errors.try_send(e.into());
            return;
        }
    }
}

/// Keepalive, error collection, quit and signal handling.
pub(crate) async fn misc_loop(
    conn: Connection,
    session: Arc<Session>,
    mut errors: mpsc::Receiver<ConnectionError>,
    mut quit: mpsc::Receiver<()>,
) {
    let options = conn.options().clone();
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + options.keepalive,
        options.keepalive,
    );
    let mut signal = pin!(shutdown_signal(options.handle_signals));
    let mut signalled = false;

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                if session.idle_for() >= options.keepalive {
                    let token = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
                    debug!(token, "Sending keepalive PING");
                    if let Err(e) = session.send_line(format!("PING {}", token)).await {
                        debug!(error = %e, "Keepalive failed");
                    }
                }
            }
            Some(err) = errors.recv() => {
                if !session.lifecycle.is_quitting() {
                    error!(error = %err, code = err.error_code(), "Connection error");
                }
                session.lifecycle.fail(err);
                return;
            }
            _ = &mut signal, if !signalled => {
                signalled = true;
                info!("Shutdown signal received, quitting");
                spawn_quit(&conn, &session, options.quit_grace);
            }
            Some(()) = quit.recv() => {
                spawn_quit(&conn, &session, options.quit_grace);
            }
        }
    }
}

/// Send QUIT, then end the session after `grace` so it reaches the server.
fn spawn_quit(conn: &Connection, session: &Arc<Session>, grace: Duration) {
    if !session.lifecycle.begin_quit() {
        return;
    }
    conn.set_state(ConnectionState::Quitting);
    let line = match &conn.options().quit_message {
        Some(reason) => format!("QUIT :{}", reason),
        None => "QUIT".to_string(),
    };
    let session = Arc::clone(session);
    tokio::spawn(async move {
        if let Err(e) = session.send_line(line).await {
            debug!(error = %e, "Could not send QUIT");
        }
        tokio::time::sleep(grace).await;
        session.lifecycle.end(SessionEnd::Quit);
    });
}

/// Resolves on SIGINT or SIGTERM. Never resolves when `enabled` is false.
pub(crate) async fn shutdown_signal(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Received SIGINT");
    }
}
