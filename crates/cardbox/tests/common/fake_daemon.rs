use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use cardbox::error::MpdError;
use cardbox::mpd::{parse_status, MediaClient, SongInfo};
use cardbox_proto::protocol::{PlaybackState, PlaybackStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The link dies mid-command.
    Drop,
    /// mpd answers with an ACK.
    Reject,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub file: String,
    pub title: Option<String>,
    pub duration: f64,
}

#[derive(Debug, Default)]
pub struct Inner {
    /// Every command that reached the daemon, in order.  Connects are logged
    /// as "connect", socket drops as "disconnect".
    pub log: Vec<String>,
    pub connected: bool,
    pub failing_connects: u32,
    /// command name -> (fault, remaining occurrences)
    pub faults: HashMap<String, (Fault, u32)>,
    pub playlists: HashMap<String, Vec<Track>>,
    pub queue: Vec<Track>,
    pub song: Option<u32>,
    pub state: PlaybackState,
    pub elapsed: f64,
    /// mpd's sticky `error` status field.
    pub error: Option<String>,
}

/// Shared view of the fake daemon for arranging and asserting.
#[derive(Clone, Default)]
pub struct FakeState(Arc<Mutex<Inner>>);

impl FakeState {
    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.0.lock().unwrap()
    }

    pub fn add_playlist(&self, name: &str, tracks: usize) {
        let tracks = (0..tracks)
            .map(|i| Track {
                file: format!("{}/{:02}.mp3", name, i + 1),
                title: Some(format!("{} track {}", name, i + 1)),
                duration: 200.0,
            })
            .collect();
        self.lock().playlists.insert(name.to_string(), tracks);
    }

    pub fn fail(&self, command: &str, fault: Fault, times: u32) {
        self.lock()
            .faults
            .insert(command.to_string(), (fault, times));
    }

    pub fn fail_connects(&self, times: u32) {
        self.lock().failing_connects = times;
    }

    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn count(&self, command: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|c| c.split(' ').next() == Some(command))
            .count()
    }

    /// The log with status/currentsong polls filtered out.
    pub fn mutations(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|c| *c != "status" && *c != "currentsong")
            .cloned()
            .collect()
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.lock().state = state;
    }

    pub fn set_elapsed(&self, elapsed: f64) {
        self.lock().elapsed = elapsed;
    }

    pub fn set_song(&self, song: Option<u32>) {
        self.lock().song = song;
    }

    pub fn set_track_title(&self, index: usize, title: Option<&str>) {
        if let Some(track) = self.lock().queue.get_mut(index) {
            track.title = title.map(str::to_string);
        }
    }

    pub fn set_error(&self, error: Option<&str>) {
        self.lock().error = error.map(str::to_string);
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }
}

/// In-memory mpd speaking the `MediaClient` seam.
pub struct FakeDaemon {
    state: FakeState,
}

impl FakeDaemon {
    pub fn new() -> (Self, FakeState) {
        let state = FakeState::default();
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }

    fn run<T>(
        &self,
        command: &str,
        apply: impl FnOnce(&mut Inner) -> Result<T, MpdError>,
    ) -> Result<T, MpdError> {
        let mut guard = self.state.lock();
        let inner: &mut Inner = &mut guard;
        if !inner.connected {
            return Err(MpdError::NotConnected);
        }
        inner.log.push(command.to_string());

        let name = command.split(' ').next().unwrap_or(command).to_string();
        let fault = match inner.faults.get_mut(&name) {
            Some((fault, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*fault)
            }
            _ => None,
        };
        match fault {
            Some(Fault::Drop) => {
                inner.connected = false;
                return Err(MpdError::Closed);
            }
            Some(Fault::Reject) => {
                return Err(MpdError::Ack {
                    code: 50,
                    command: name,
                    message: "rejected".to_string(),
                });
            }
            None => {}
        }
        apply(inner)
    }
}

impl MediaClient for FakeDaemon {
    async fn connect(&mut self, _address: &str) -> Result<(), MpdError> {
        let mut inner = self.state.lock();
        inner.log.push("connect".to_string());
        if inner.connected {
            return Err(MpdError::AlreadyConnected);
        }
        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(MpdError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }
        inner.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn status(&mut self) -> Result<PlaybackStatus, MpdError> {
        self.run("status", |d| {
            // rendered as mpd would send it so the real parser is exercised
            let state = match d.state {
                PlaybackState::Playing => "play",
                PlaybackState::Paused => "pause",
                _ => "stop",
            };
            let mut pairs = vec![
                ("state".to_string(), state.to_string()),
                ("playlistlength".to_string(), d.queue.len().to_string()),
            ];
            if let Some(i) = d.song {
                pairs.push(("song".to_string(), i.to_string()));
                pairs.push(("elapsed".to_string(), d.elapsed.to_string()));
                if let Some(track) = d.queue.get(i as usize) {
                    pairs.push(("duration".to_string(), track.duration.to_string()));
                }
            }
            if let Some(error) = &d.error {
                pairs.push(("error".to_string(), error.clone()));
            }
            Ok(parse_status(&pairs))
        })
    }

    async fn current_song(&mut self) -> Result<SongInfo, MpdError> {
        self.run("currentsong", |d| {
            Ok(d.song
                .and_then(|i| d.queue.get(i as usize))
                .map(|t| SongInfo {
                    file: Some(t.file.clone()),
                    title: t.title.clone(),
                    duration_secs: Some(t.duration),
                })
                .unwrap_or_default())
        })
    }

    async fn update(&mut self) -> Result<(), MpdError> {
        self.run("update", |_| Ok(()))
    }

    async fn clear(&mut self) -> Result<(), MpdError> {
        self.run("clear", |d| {
            d.queue.clear();
            d.song = None;
            d.state = PlaybackState::Stopped;
            Ok(())
        })
    }

    async fn load(&mut self, playlist: &str) -> Result<(), MpdError> {
        self.run(&format!("load {}", playlist), |d| {
            let tracks = d.playlists.get(playlist).cloned().ok_or(MpdError::Ack {
                code: 50,
                command: "load".to_string(),
                message: "No such playlist".to_string(),
            })?;
            d.queue.extend(tracks);
            Ok(())
        })
    }

    async fn play(&mut self) -> Result<(), MpdError> {
        self.run("play", |d| {
            if d.queue.is_empty() {
                return Err(MpdError::Ack {
                    code: 2,
                    command: "play".to_string(),
                    message: "Bad song index".to_string(),
                });
            }
            d.song = Some(0);
            d.elapsed = 0.0;
            d.state = PlaybackState::Playing;
            Ok(())
        })
    }

    async fn pause(&mut self) -> Result<(), MpdError> {
        self.run("pause", |d| {
            d.state = match d.state {
                PlaybackState::Playing => PlaybackState::Paused,
                PlaybackState::Paused => PlaybackState::Playing,
                other => other,
            };
            Ok(())
        })
    }

    async fn next(&mut self) -> Result<(), MpdError> {
        self.run("next", |d| {
            if let Some(i) = d.song {
                if (i as usize) + 1 < d.queue.len() {
                    d.song = Some(i + 1);
                    d.elapsed = 0.0;
                }
            }
            Ok(())
        })
    }

    async fn previous(&mut self) -> Result<(), MpdError> {
        self.run("previous", |d| {
            if let Some(i) = d.song {
                d.song = Some(i.saturating_sub(1));
                d.elapsed = 0.0;
            }
            Ok(())
        })
    }

    async fn stop(&mut self) -> Result<(), MpdError> {
        self.run("stop", |d| {
            d.state = PlaybackState::Stopped;
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<(), MpdError> {
        self.run("close", |_| Ok(()))
    }

    fn disconnect(&mut self) {
        let mut inner = self.state.lock();
        if inner.connected {
            inner.log.push("disconnect".to_string());
        }
        inner.connected = false;
    }
}
