//! Music player daemon backend
//!
//! Speaks the MPD text protocol over one persistent TCP connection:
//!
//! ```text
//! <- OK MPD 0.23.5
//! -> add "podcasts/ep12.mp3"
//! <- OK
//! -> status
//! <- state: play
//! <- elapsed: 12.031
//! <- OK
//! ```
//!
//! Failed commands are answered with `ACK [code@index] {command} message`.
//! The connection is opened lazily and re-established once when an exchange
//! fails at the I/O level.

use super::{BackendError, NowPlaying, PlayerBackend, PlayerStatus};
use crate::config::MpdConfig;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const GREETING_PREFIX: &str = "OK MPD ";

type Pairs = Vec<(String, String)>;

pub struct MpdBackend {
    address: String,
    password: Option<String>,
    timeout: Duration,
    conn: Option<MpdConnection>,
}

struct MpdConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MpdBackend {
    pub fn new(config: &MpdConfig) -> Self {
        Self {
            address: config.address.clone(),
            password: Some(config.password.clone()).filter(|p| !p.is_empty()),
            timeout: config.timeout(),
            conn: None,
        }
    }

    /// Send one command, reconnecting once if the connection went stale
    async fn run(&mut self, command: &str) -> Result<Pairs, BackendError> {
        let mut retried = false;
        loop {
            if self.conn.is_none() {
                self.conn = Some(self.connect().await?);
            }
            let Some(conn) = self.conn.as_mut() else {
                return Err(BackendError::NotConnected(self.address.clone()));
            };

            let result = match tokio::time::timeout(self.timeout, conn.exchange(command)).await {
                Ok(result) => result,
                Err(_) => Err(timed_out(command)),
            };

            match result {
                Err(e) if e.is_connection_failure() => {
                    self.conn = None;
                    if retried {
                        return Err(e);
                    }
                    warn!("MPD connection lost during '{}': {}; reconnecting", verb(command), e);
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn connect(&self) -> Result<MpdConnection, BackendError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| timed_out("connect"))?
            .map_err(|e| BackendError::NotConnected(format!("{}: {}", self.address, e)))?;

        let (read_half, writer) = stream.into_split();
        let mut conn = MpdConnection {
            reader: BufReader::new(read_half),
            writer,
        };

        let greeting = tokio::time::timeout(self.timeout, conn.read_line())
            .await
            .map_err(|_| timed_out("greeting"))??;
        let Some(version) = greeting.strip_prefix(GREETING_PREFIX) else {
            return Err(BackendError::Protocol(format!(
                "unexpected greeting from {}: {:?}",
                self.address, greeting
            )));
        };

        if let Some(password) = &self.password {
            let command = format!("password {}", quote(password));
            tokio::time::timeout(self.timeout, conn.exchange(&command))
                .await
                .map_err(|_| timed_out("password"))??;
        }

        info!("Connected to MPD {} at {}", version, self.address);
        Ok(conn)
    }
}

impl MpdConnection {
    async fn read_line(&mut self) -> Result<String, BackendError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by daemon",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Write a command and collect its `key: value` response
    async fn exchange(&mut self, command: &str) -> Result<Pairs, BackendError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut pairs = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "OK" {
                return Ok(pairs);
            }
            if line.starts_with("ACK ") {
                return Err(parse_ack(&line));
            }
            match line.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
                None => {
                    return Err(BackendError::Protocol(format!(
                        "malformed response line: {:?}",
                        line
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl PlayerBackend for MpdBackend {
    fn name(&self) -> &'static str {
        "mpd"
    }

    async fn start(&mut self, path: &str, offset_seconds: f64) -> Result<(), BackendError> {
        self.run("clear").await?;
        self.run(&format!("add {}", quote(path))).await?;
        self.run("play").await?;
        if offset_seconds > 0.0 {
            self.run(&format!("seek 0 {}", format_seconds(offset_seconds))).await?;
        }
        debug!("MPD playing {} from {}s", path, offset_seconds);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        self.run("stop").await?;
        self.run("clear").await?;
        Ok(())
    }

    async fn status(&mut self) -> Result<PlayerStatus, BackendError> {
        let pairs = self.run("status").await?;
        let is_playing = field(&pairs, "state") == Some("play");
        let elapsed = field(&pairs, "elapsed").and_then(|v| v.parse::<f64>().ok());
        Ok(PlayerStatus { elapsed, is_playing })
    }

    async fn now_playing(&mut self) -> Result<Option<NowPlaying>, BackendError> {
        let pairs = self.run("currentsong").await?;
        let tag = |key: &str| field(&pairs, key).map(str::to_string);
        let song = NowPlaying {
            title: tag("Title"),
            artist: tag("Artist"),
            album: tag("Album"),
        };
        Ok(Some(song).filter(|s| !s.is_empty()))
    }
}

fn field<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Quote a command argument, escaping `"` and `\`
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Parse `ACK [code@index] {command} message`
pub fn parse_ack(line: &str) -> BackendError {
    let rest = line.strip_prefix("ACK ").unwrap_or(line);

    let parsed = (|| {
        let rest = rest.strip_prefix('[')?;
        let (code_part, rest) = rest.split_once(']')?;
        let code = code_part.split('@').next()?.parse::<u32>().ok()?;
        let rest = rest.trim_start().strip_prefix('{')?;
        let (command, message) = rest.split_once('}')?;
        Some((code, command.to_string(), message.trim().to_string()))
    })();

    match parsed {
        Some((code, command, message)) => BackendError::Ack {
            code,
            command,
            message,
        },
        None => BackendError::Protocol(format!("malformed ACK: {:?}", line)),
    }
}

fn format_seconds(seconds: f64) -> String {
    let text = format!("{:.3}", seconds);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn verb(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

fn timed_out(what: &str) -> BackendError {
    BackendError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("MPD {} timed out", verb(what)),
    ))
}
