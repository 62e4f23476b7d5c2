/// PlaybackController: the one player handle shared by every thread.
///
/// Owns the mpd connection behind `ExclusiveConnection`; every public
/// operation takes the guard for its whole command sequence, so a card tap
/// and a touch on "next" can never interleave their commands.
///
/// Retry policy: only `play` reconnects and retries (bounded).  Everything
/// else hands connection errors back to the caller; the guard re-dials on
/// the next acquisition.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use cardbox_proto::config::MpdConfig;
use cardbox_proto::protocol::{CurrentTrack, PlaybackState, PlaybackStatus, PlaylistSelection};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionGuard, ExclusiveConnection};
use crate::error::{MpdError, PlaybackError};
use crate::mpd::MediaClient;

/// Receives "now playing" notifications.  Registered after construction so
/// the controller never owns the UI.
pub trait PlaybackObserver: Send + Sync {
    fn playlist_started(&self, selection: &PlaylistSelection);
}

/// Result of a `play` request.  Failures are already logged.
#[derive(Debug)]
pub enum PlayOutcome {
    Started,
    /// The same playlist is already on air; nothing was sent.
    AlreadyPlaying,
    Failed(PlaybackError),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub play_attempts: u32,
    pub reconnect_backoff: Duration,
    pub update_on_start: bool,
}

impl From<&MpdConfig> for RetryPolicy {
    fn from(config: &MpdConfig) -> Self {
        Self {
            play_attempts: config.play_attempts.max(1),
            reconnect_backoff: config.reconnect_backoff(),
            update_on_start: config.update_on_start,
        }
    }
}

pub struct PlaybackController<C> {
    connection: ExclusiveConnection<C>,
    /// Written only inside a successful `play`, under the connection guard.
    current_playlist: Mutex<Option<String>>,
    observer: RwLock<Option<Arc<dyn PlaybackObserver>>>,
    ready: AtomicBool,
    policy: RetryPolicy,
}

impl<C: MediaClient> PlaybackController<C> {
    pub fn new(client: C, address: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            connection: ExclusiveConnection::new(client, address),
            current_playlist: Mutex::new(None),
            observer: RwLock::new(None),
            ready: AtomicBool::new(false),
            policy,
        }
    }

    pub fn from_config(client: C, config: &MpdConfig) -> Self {
        Self::new(client, config.address(), RetryPolicy::from(config))
    }

    pub fn link_observer(&self, observer: Arc<dyn PlaybackObserver>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn current_playlist_name(&self) -> Option<String> {
        self.current_playlist
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── lifecycle ─────────────────────────────────────────────────────────────

    /// Connect and reset the daemon queue.  Blocks until mpd answers; at boot
    /// mpd often starts after us.
    pub async fn initialize(&self) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.try_initialize().await {
                Ok(()) => {
                    self.ready.store(true, Ordering::Release);
                    info!(
                        "player: connected to mpd at {} after {} attempt(s)",
                        self.connection.address(),
                        attempt
                    );
                    return;
                }
                Err(e) => {
                    error!(
                        "player: connection to mpd failed ({}), trying again in {:?}",
                        e, self.policy.reconnect_backoff
                    );
                    tokio::time::sleep(self.policy.reconnect_backoff).await;
                }
            }
        }
    }

    async fn try_initialize(&self) -> Result<(), MpdError> {
        let mut conn = self.connection.acquire().await;
        conn.ensure_connected().await?;
        if self.policy.update_on_start {
            match conn.update().await {
                Ok(()) => debug!("player: library rescan requested"),
                Err(e) if e.is_connection_error() => return Err(e),
                Err(e) => warn!("player: library rescan refused: {}", e),
            }
        }
        conn.clear().await
    }

    /// Stop, clear, hang up, drop the socket.  Each step runs even if an
    /// earlier one failed so mpd is left idle for the next boot.
    pub async fn close(&self) {
        let mut conn = self.connection.acquire().await;
        self.ready.store(false, Ordering::Release);

        if let Err(e) = conn.ensure_connected().await {
            warn!("player: close: mpd unreachable: {}", e);
        }
        if let Err(e) = conn.stop().await {
            warn!("player: close: stop failed: {}", e);
        }
        if let Err(e) = conn.clear().await {
            warn!("player: close: clear failed: {}", e);
        }
        if let Err(e) = conn.close().await {
            debug!("player: close: close failed: {}", e);
        }
        conn.disconnect();
        info!("player: closed");
    }

    // ── playlist selection ────────────────────────────────────────────────────

    /// Start the playlist named by `selection` from its first track.
    pub async fn play(&self, selection: PlaylistSelection) -> PlayOutcome {
        let id = selection.id.as_str();
        let attempts = self.policy.play_attempts.max(1);
        let mut conn = self.connection.acquire().await;
        debug!(
            "play: '{}' requested at {}",
            id,
            selection.requested_at.format("%H:%M:%S%.3f")
        );

        let mut last_err = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                if let Err(e) = conn.reconnect().await {
                    warn!("play: reconnect {}/{} failed: {}", attempt, attempts, e);
                    last_err = Some(e);
                    continue;
                }
            }

            match self.start_playlist(&mut conn, id).await {
                Ok(true) => {
                    log_now_playing(&mut conn, id).await;
                    drop(conn);
                    self.notify(&selection);
                    return PlayOutcome::Started;
                }
                Ok(false) => {
                    debug!("play: '{}' already playing, ignoring", id);
                    return PlayOutcome::AlreadyPlaying;
                }
                Err(e) if e.is_connection_error() => {
                    warn!(
                        "play: connection error on attempt {}/{} for '{}': {}",
                        attempt, attempts, id, e
                    );
                    last_err = Some(e);
                }
                Err(e) => {
                    error!("play: could not play playlist '{}': {}", id, e);
                    return PlayOutcome::Failed(e.into());
                }
            }
        }

        let err = PlaybackError::RetriesExhausted {
            playlist: id.to_string(),
            attempts,
            source: last_err.unwrap_or(MpdError::NotConnected),
        };
        error!("play: {}", err);
        PlayOutcome::Failed(err)
    }

    /// Returns false when the requested playlist is already playing.
    async fn start_playlist(
        &self,
        conn: &mut ConnectionGuard<'_, C>,
        id: &str,
    ) -> Result<bool, MpdError> {
        conn.ensure_connected().await?;
        let status = conn.status().await?;
        if status.state == PlaybackState::Playing
            && self.current_playlist_name().as_deref() == Some(id)
        {
            return Ok(false);
        }

        conn.clear().await?;
        conn.load(id).await?;
        conn.play().await?;
        *self.current_playlist.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(id.to_string());
        info!("play: started playlist '{}'", id);
        Ok(true)
    }

    fn notify(&self, selection: &PlaylistSelection) {
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match observer {
            Some(observer) => observer.playlist_started(selection),
            None => debug!("play: no observer linked"),
        }
    }

    // ── transport ─────────────────────────────────────────────────────────────

    /// Toggle play/pause.  Calling it while stopped is mpd's business.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let mut conn = self.connection.acquire().await;
        conn.ensure_connected().await?;
        conn.pause().await?;
        Ok(())
    }

    /// Skip forward.  Returns whether the command was sent: single-entry
    /// playlists ignore transport controls.
    pub async fn next(&self) -> Result<bool, PlaybackError> {
        let mut conn = self.connection.acquire().await;
        conn.ensure_connected().await?;
        if conn.status().await?.playlist_length <= 1 {
            debug!("next: single-entry playlist, ignored");
            return Ok(false);
        }
        conn.next().await?;
        Ok(true)
    }

    pub async fn prev(&self) -> Result<bool, PlaybackError> {
        let mut conn = self.connection.acquire().await;
        conn.ensure_connected().await?;
        if conn.status().await?.playlist_length <= 1 {
            debug!("prev: single-entry playlist, ignored");
            return Ok(false);
        }
        conn.previous().await?;
        Ok(true)
    }

    // ── queries ───────────────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<PlaybackStatus, PlaybackError> {
        let mut conn = self.connection.acquire().await;
        if !self.is_ready() {
            return Ok(PlaybackStatus::connecting());
        }
        conn.ensure_connected().await?;
        Ok(conn.status().await?)
    }

    pub async fn current_track(&self) -> Result<CurrentTrack, PlaybackError> {
        let mut conn = self.connection.acquire().await;
        conn.ensure_connected().await?;
        let status = conn.status().await?;
        let song = conn.current_song().await?;
        Ok(CurrentTrack {
            file: song.file,
            title: song.title,
            elapsed_secs: status.elapsed_secs.unwrap_or(0.0),
            total_secs: song
                .duration_secs
                .or(status.duration_secs)
                .unwrap_or(0.0),
        })
    }
}

async fn log_now_playing<C: MediaClient>(conn: &mut ConnectionGuard<'_, C>, id: &str) {
    match conn.current_song().await {
        Ok(song) => debug!(
            "play: '{}' now on {:?} ({:?})",
            id,
            song.title.as_deref().unwrap_or("<untitled>"),
            song.file
        ),
        Err(e) => debug!("play: currentsong after start failed: {}", e),
    }
}
