//! The server side of one accepted client connection.

use std::time::Duration;

use tether::proto::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use super::server::SERVER_NAME;

/// A scripted server peer.
pub struct MockPeer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: BufWriter<OwnedWriteHalf>,
}

#[allow(dead_code)]
impl MockPeer {
    pub(crate) fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer: BufWriter::new(write_half),
        }
    }

    /// Send a raw line to the client. CRLF is appended.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send `:mock.server <rest>`.
    pub async fn send_from_server(&mut self, rest: &str) -> anyhow::Result<()> {
        self.send_raw(&format!(":{SERVER_NAME} {rest}")).await
    }

    /// Receive a single line from the client, without its line ending.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a line with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        match timeout(dur, self.lines.next_line()).await?? {
            Some(line) => Ok(line.trim_end_matches('\r').to_string()),
            None => anyhow::bail!("client closed the connection"),
        }
    }

    /// Receive a line and parse it.
    pub async fn recv_message(&mut self) -> anyhow::Result<Message> {
        let line = self.recv().await?;
        Message::parse(&line, SERVER_NAME).map_err(|e| anyhow::anyhow!("Parse error: {}", e))
    }

    /// Receive the next line and require it to equal `expected`.
    pub async fn expect(&mut self, expected: &str) -> anyhow::Result<()> {
        let line = self.recv().await?;
        anyhow::ensure!(line == expected, "expected {expected:?}, got {line:?}");
        Ok(())
    }

    /// Receive lines until one satisfies `predicate`, returning all of them.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut lines = Vec::new();
        loop {
            let line = self.recv().await?;
            let done = predicate(&line);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// True if the client sends nothing (or closes) within `dur`.
    pub async fn is_quiet_for(&mut self, dur: Duration) -> bool {
        timeout(dur, self.lines.next_line()).await.is_err()
    }

    /// Read the client's registration burst: `CAP LS 302`, optional PASS,
    /// NICK and USER. Returns the NICK it asked for.
    pub async fn read_registration(&mut self) -> anyhow::Result<String> {
        self.expect("CAP LS 302").await?;
        let mut line = self.recv().await?;
        if line.starts_with("PASS ") {
            line = self.recv().await?;
        }
        let nick = line
            .strip_prefix("NICK ")
            .ok_or_else(|| anyhow::anyhow!("expected NICK, got {line:?}"))?
            .to_string();
        let user = self.recv().await?;
        anyhow::ensure!(user.starts_with("USER "), "expected USER, got {user:?}");
        Ok(nick)
    }

    /// Answer the registration with an empty capability list and a welcome.
    pub async fn welcome(&mut self, nick: &str) -> anyhow::Result<()> {
        self.send_from_server("CAP * LS :").await?;
        self.expect("CAP END").await?;
        self.send_from_server(&format!("001 {nick} :Welcome to the mock network {nick}"))
            .await?;
        self.send_from_server(&format!("376 {nick} :End of /MOTD command."))
            .await
    }
}
