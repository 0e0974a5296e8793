//! tether - IRC bot runner
//!
//! Loads a TOML config, joins the configured channels once registered and
//! keeps the connection alive with reconnect back-off.

use std::sync::Arc;

use tether::config::Config;
use tether::dispatch::subscriber_fn;
use tether::proto::Message;
use tether::{ChannelPart, Connection, telemetry};
use tracing::{error, info, warn};

/// Environment variable naming the config file when no argument is given.
const CONFIG_ENV: &str = "TETHER_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config {config_path}: {e}");
            return Err(e.into());
        }
    };

    telemetry::init(config.log_level(), config.log.log_format());

    let client = config.client_config();
    info!(
        server = %client.server,
        nick = %client.nickname,
        tls = client.tls,
        "Starting tether"
    );

    let conn = Connection::new(client, config.connection_options());
    install_bot(&conn, config.bot.channels.clone());

    match conn
        .connect_and_wait_with_retry(config.connection.max_retries)
        .await
    {
        Ok(()) => {
            info!("Disconnected");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Connection ended");
            Err(e.into())
        }
    }
}

/// Autojoin on welcome and fan channel traffic out to the event bus.
fn install_bot(conn: &Connection, channels: Vec<String>) {
    let channels = Arc::new(channels);
    conn.add_inbound_handler("001", move |conn, _msg| {
        let channels = Arc::clone(&channels);
        async move {
            for channel in channels.iter() {
                if let Err(e) = conn.send_raw(format!("JOIN :{channel}")).await {
                    warn!(%channel, error = %e, "Autojoin failed");
                    return;
                }
            }
        }
    });

    conn.add_inbound_handler("PRIVMSG", |conn, msg| async move {
        if msg.param(0).is_some_and(is_channel) {
            conn.events()
                .channel_message()
                .publish(&conn, Message::clone(&msg));
        }
    });

    conn.add_inbound_handler("PART", |conn, msg| async move {
        let Some(channel) = msg.param(0) else {
            return;
        };
        let part = ChannelPart {
            channel: channel.to_string(),
            nick: msg.source_nick().to_string(),
            reason: msg.param(1).map(str::to_string),
        };
        conn.events().channel_part().publish(&conn, part);
    });

    conn.events()
        .channel_message()
        .subscribe(subscriber_fn(|_conn, msg: Arc<Message>| async move {
            info!(
                target: "tether::chat",
                channel = msg.param(0).unwrap_or_default(),
                from = msg.source_nick(),
                text = msg.trailing().unwrap_or_default(),
                "privmsg"
            );
        }));

    conn.events()
        .channel_part()
        .subscribe(subscriber_fn(|_conn, part: Arc<ChannelPart>| async move {
            info!(
                target: "tether::chat",
                channel = %part.channel,
                nick = %part.nick,
                reason = part.reason.as_deref().unwrap_or_default(),
                "part"
            );
        }));
}

fn is_channel(name: &str) -> bool {
    name.starts_with(['#', '&', '+', '!'])
}
