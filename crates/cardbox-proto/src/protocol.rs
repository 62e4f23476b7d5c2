use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Playback state as reported by the daemon on each status query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// The controller has not finished its first connection yet.
    Connecting,
    /// The daemon reports a playback error (unreadable file, missing output).
    Error,
}

impl PlaybackState {
    /// True while a playlist is loaded and not stopped.
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

/// Raw status snapshot.  Indices follow the daemon: `song` is 0-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub song: Option<u32>,
    pub playlist_length: u32,
    pub elapsed_secs: Option<f64>,
    pub duration_secs: Option<f64>,
}

impl PlaybackStatus {
    pub fn connecting() -> Self {
        Self {
            state: PlaybackState::Connecting,
            ..Self::default()
        }
    }

    pub fn has_previous(&self) -> bool {
        matches!(self.song, Some(idx) if idx > 0)
    }

    pub fn has_next(&self) -> bool {
        matches!(self.song, Some(idx) if idx + 1 < self.playlist_length)
    }
}

/// What is on air right now.  A missing title or zero durations are valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentTrack {
    pub file: Option<String>,
    pub title: Option<String>,
    pub elapsed_secs: f64,
    pub total_secs: f64,
}

impl CurrentTrack {
    /// No song is loaded at all (empty playlist or stopped past the end).
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.title.is_none()
    }

    /// Fraction played, clamped to `0.0..=1.0`.  Elapsed time overshoots the
    /// total by a few milliseconds at the end of a song.
    pub fn progress(&self) -> f32 {
        if self.total_secs <= 0.0 || !self.elapsed_secs.is_finite() {
            return 0.0;
        }
        (self.elapsed_secs / self.total_secs).clamp(0.0, 1.0) as f32
    }
}

/// Four-byte card UID.  Rendered as dotted decimal, which is also the name
/// of the playlist the card plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(pub [u8; 4]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tag id '{0}', expected a.b.c.d")]
pub struct TagIdParseError(pub String);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl FromStr for TagId {
    type Err = TagIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 4];
        let mut parts = s.trim().split('.');
        for slot in out.iter_mut() {
            *slot = parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(|| TagIdParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(TagIdParseError(s.to_string()));
        }
        Ok(TagId(out))
    }
}

/// A request to play the playlist belonging to a card.  Consumed by exactly
/// one `play` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSelection {
    pub id: String,
    pub requested_at: DateTime<Local>,
}

impl PlaylistSelection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            requested_at: Local::now(),
        }
    }

    pub fn from_tag(tag: TagId) -> Self {
        Self::new(tag.to_string())
    }
}
