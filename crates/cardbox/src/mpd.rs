/// mpd client over the plain-text line protocol.
///
/// ```text
///   connect ──► "OK MPD 0.23.5"            greeting
///   "status" ──► "state: play"             key/value lines
///                "elapsed: 12.031"
///                "OK"                      terminator (or "ACK [50@0] {load} ...")
/// ```
///
/// One request is in flight at a time; `MpdClient` is not internally
/// synchronised.  Callers go through `ExclusiveConnection`, which owns the
/// only instance.
use std::future::Future;
use std::time::Duration;

use cardbox_proto::protocol::{PlaybackState, PlaybackStatus};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::MpdError;

// ── media client seam ─────────────────────────────────────────────────────────

/// `currentsong` reduced to what the appliance shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongInfo {
    pub file: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
}

/// The daemon commands the playback core relies on.  `MpdClient` is the
/// production implementation; tests substitute an in-memory daemon.
pub trait MediaClient: Send {
    fn connect(&mut self, address: &str) -> impl Future<Output = Result<(), MpdError>> + Send;
    fn is_connected(&self) -> bool;
    fn status(&mut self) -> impl Future<Output = Result<PlaybackStatus, MpdError>> + Send;
    fn current_song(&mut self) -> impl Future<Output = Result<SongInfo, MpdError>> + Send;
    fn update(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    fn clear(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    fn load(&mut self, playlist: &str) -> impl Future<Output = Result<(), MpdError>> + Send;
    /// Start at the first entry of the queue.
    fn play(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    /// Toggle between play and pause.
    fn pause(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    fn next(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    fn previous(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    fn stop(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    /// Ask the daemon to hang up.
    fn close(&mut self) -> impl Future<Output = Result<(), MpdError>> + Send;
    /// Drop the socket.  Infallible and idempotent.
    fn disconnect(&mut self);
}

// ── tcp implementation ────────────────────────────────────────────────────────

pub struct MpdClient {
    stream: Option<BufReader<TcpStream>>,
    timeout: Duration,
    server_version: Option<String>,
}

impl MpdClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            stream: None,
            timeout,
            server_version: None,
        }
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Send one command and collect its `key: value` reply.  A connection
    /// level failure drops the socket so `is_connected` reports the truth.
    async fn command(&mut self, line: &str) -> Result<Vec<(String, String)>, MpdError> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(MpdError::NotConnected)?;

        debug!("mpd: send {}", line);
        let result = match tokio::time::timeout(timeout, exchange(stream, line)).await {
            Ok(r) => r,
            Err(_) => Err(MpdError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            if e.is_connection_error() {
                warn!("mpd: dropping connection after '{}': {}", line, e);
                self.stream = None;
            } else {
                debug!("mpd: '{}' failed: {}", line, e);
            }
        }
        result
    }
}

async fn exchange(
    stream: &mut BufReader<TcpStream>,
    line: &str,
) -> Result<Vec<(String, String)>, MpdError> {
    let mut payload = String::with_capacity(line.len() + 1);
    payload.push_str(line);
    payload.push('\n');
    stream.get_mut().write_all(payload.as_bytes()).await?;

    let mut pairs = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        if stream.read_line(&mut buf).await? == 0 {
            return Err(MpdError::Closed);
        }
        let reply = buf.trim_end_matches(['\r', '\n']);
        if reply == "OK" {
            return Ok(pairs);
        }
        if reply.starts_with("ACK ") {
            return Err(parse_ack(reply));
        }
        match reply.split_once(": ") {
            Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
            None => return Err(MpdError::Protocol(format!("unexpected line '{}'", reply))),
        }
    }
}

impl MediaClient for MpdClient {
    async fn connect(&mut self, address: &str) -> Result<(), MpdError> {
        if self.stream.is_some() {
            return Err(MpdError::AlreadyConnected);
        }

        let timeout = self.timeout;
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| MpdError::Timeout(timeout))??;
        let mut stream = BufReader::new(tcp);

        let mut greeting = String::new();
        let n = tokio::time::timeout(timeout, stream.read_line(&mut greeting))
            .await
            .map_err(|_| MpdError::Timeout(timeout))??;
        if n == 0 {
            return Err(MpdError::Closed);
        }
        let version = greeting
            .trim_end()
            .strip_prefix("OK MPD ")
            .ok_or_else(|| MpdError::Protocol(format!("bad greeting '{}'", greeting.trim_end())))?;

        info!("mpd: connected to {} (protocol {})", address, version);
        self.server_version = Some(version.to_string());
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn status(&mut self) -> Result<PlaybackStatus, MpdError> {
        let pairs = self.command("status").await?;
        Ok(parse_status(&pairs))
    }

    async fn current_song(&mut self) -> Result<SongInfo, MpdError> {
        let pairs = self.command("currentsong").await?;
        Ok(parse_song(&pairs))
    }

    async fn update(&mut self) -> Result<(), MpdError> {
        self.command("update").await.map(drop)
    }

    async fn clear(&mut self) -> Result<(), MpdError> {
        self.command("clear").await.map(drop)
    }

    async fn load(&mut self, playlist: &str) -> Result<(), MpdError> {
        let line = format!("load {}", quote(playlist));
        self.command(&line).await.map(drop)
    }

    async fn play(&mut self) -> Result<(), MpdError> {
        self.command("play 0").await.map(drop)
    }

    async fn pause(&mut self) -> Result<(), MpdError> {
        self.command("pause").await.map(drop)
    }

    async fn next(&mut self) -> Result<(), MpdError> {
        self.command("next").await.map(drop)
    }

    async fn previous(&mut self) -> Result<(), MpdError> {
        self.command("previous").await.map(drop)
    }

    async fn stop(&mut self) -> Result<(), MpdError> {
        self.command("stop").await.map(drop)
    }

    async fn close(&mut self) -> Result<(), MpdError> {
        // mpd hangs up without replying to "close"
        let stream = self.stream.as_mut().ok_or(MpdError::NotConnected)?;
        stream.get_mut().write_all(b"close\n").await?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("mpd: socket dropped");
        }
    }
}

// ── reply parsing ─────────────────────────────────────────────────────────────

fn field<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

pub fn parse_status(pairs: &[(String, String)]) -> PlaybackStatus {
    let state = match field(pairs, "state") {
        Some("play") => PlaybackState::Playing,
        Some("pause") => PlaybackState::Paused,
        _ => PlaybackState::Stopped,
    };
    // "error" lingers in status until "clearerror"; a loaded queue that is
    // playing or paused still counts as such
    let state = if state == PlaybackState::Stopped && field(pairs, "error").is_some() {
        PlaybackState::Error
    } else {
        state
    };

    // "time: 12:241" predates the elapsed/duration fields
    let legacy_time = field(pairs, "time").and_then(|t| t.split_once(':'));

    PlaybackStatus {
        state,
        song: field(pairs, "song").and_then(|s| s.parse().ok()),
        playlist_length: field(pairs, "playlistlength")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        elapsed_secs: field(pairs, "elapsed")
            .and_then(|s| s.parse().ok())
            .or_else(|| legacy_time.and_then(|(e, _)| e.parse().ok())),
        duration_secs: field(pairs, "duration")
            .and_then(|s| s.parse().ok())
            .or_else(|| legacy_time.and_then(|(_, d)| d.parse().ok())),
    }
}

pub fn parse_song(pairs: &[(String, String)]) -> SongInfo {
    SongInfo {
        file: field(pairs, "file").map(str::to_string),
        title: field(pairs, "Title")
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string),
        // "duration" carries fractions, "Time" is whole seconds
        duration_secs: pairs
            .iter()
            .find(|(k, _)| k == "duration")
            .or_else(|| pairs.iter().find(|(k, _)| k == "Time"))
            .and_then(|(_, v)| v.parse().ok()),
    }
}

/// `ACK [50@0] {load} No such playlist`
fn parse_ack(line: &str) -> MpdError {
    let rest = line.trim_start_matches("ACK ").trim();
    let code = rest
        .strip_prefix('[')
        .and_then(|r| r.split_once('@'))
        .and_then(|(c, _)| c.parse().ok())
        .unwrap_or(0);
    let command = rest
        .split_once('{')
        .and_then(|(_, r)| r.split_once('}'))
        .map(|(c, _)| c.to_string())
        .unwrap_or_default();
    let message = rest
        .split_once('}')
        .map(|(_, m)| m.trim().to_string())
        .unwrap_or_else(|| rest.to_string());
    MpdError::Ack {
        code,
        command,
        message,
    }
}

fn quote(arg: &str) -> String {
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
