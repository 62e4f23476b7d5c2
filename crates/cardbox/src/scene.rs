/// UI refresh loop and the scene it drives.
///
/// `SceneController` runs on the main task.  It ticks at a fixed rate,
/// mirrors the player's state onto the scene, handles touches and card
/// activations from its event queue, and fires the idle shutdown.  It is the
/// only code that mutates the scene.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cardbox_proto::config::{DisplayConfig, UiConfig};
use cardbox_proto::protocol::{CurrentTrack, PlaybackState, PlaybackStatus, PlaylistSelection};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::activity::SharedState;
use crate::error::PlaybackError;
use crate::mpd::MediaClient;
use crate::player::{PlaybackController, PlaybackObserver};
use crate::shutdown::{ShutdownReason, ShutdownSignal};

/// Highest backlight PWM duty the panel accepts.
pub const MAX_BRIGHTNESS: u16 = 1023;

// ── events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    PlayPause,
    Prev,
    Next,
    /// The full-screen image behind the buttons.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayIcon {
    Play,
    Pause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Click {
        control: Control,
        button: PointerButton,
    },
    /// A card started its playlist; carries the playlist id.
    CardActivated(String),
}

/// Forwards "now playing" notifications from the player into the UI queue,
/// so the tag thread never touches the scene itself.
pub struct UiNotifier(mpsc::Sender<UiEvent>);

impl UiNotifier {
    pub fn new(tx: mpsc::Sender<UiEvent>) -> Self {
        Self(tx)
    }
}

impl PlaybackObserver for UiNotifier {
    fn playlist_started(&self, selection: &PlaylistSelection) {
        if let Err(e) = self.0.try_send(UiEvent::CardActivated(selection.id.clone())) {
            warn!("ui: dropped card activation '{}': {}", selection.id, e);
        }
    }
}

// ── scene ─────────────────────────────────────────────────────────────────────

/// The display surface.  Implementations render; they keep no playback logic.
pub trait Scene: Send {
    fn set_now_playing_title(&mut self, title: &str);
    fn new_card_activated(&mut self, id: &str);
    /// `name` is an image file stem inside the images directory.
    fn set_background_image(&mut self, name: &str);
    fn set_progress(&mut self, progress: f32);
    fn set_progress_visible(&mut self, visible: bool);
    fn set_buttons_visible(&mut self, visible: bool);
    fn set_play_icon(&mut self, icon: PlayIcon);
    /// Backlight duty, `0..=MAX_BRIGHTNESS`.
    fn set_brightness(&mut self, level: u16);
}

/// Scene for running without a display: logs each change of presentation.
#[derive(Debug)]
pub struct HeadlessScene {
    images_dir: PathBuf,
    title: String,
    background: Option<PathBuf>,
    progress_percent: u8,
    progress_visible: bool,
    buttons_visible: bool,
    icon: PlayIcon,
    brightness: u16,
}

impl HeadlessScene {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            title: String::new(),
            background: None,
            progress_percent: 0,
            progress_visible: false,
            buttons_visible: false,
            icon: PlayIcon::Play,
            brightness: 0,
        }
    }

    pub fn brightness(&self) -> u16 {
        self.brightness
    }

    pub fn background(&self) -> Option<&PathBuf> {
        self.background.as_ref()
    }
}

impl Scene for HeadlessScene {
    fn set_now_playing_title(&mut self, title: &str) {
        if self.title != title {
            info!("scene: now playing {:?}", title);
            self.title = title.to_string();
        }
    }

    fn new_card_activated(&mut self, id: &str) {
        info!("scene: card {}", id);
    }

    fn set_background_image(&mut self, name: &str) {
        let path = self.images_dir.join(format!("{}.png", name));
        if !path.exists() {
            debug!("scene: background {} not found", path.display());
        }
        info!("scene: background {}", path.display());
        self.background = Some(path);
    }

    fn set_progress(&mut self, progress: f32) {
        let percent = (progress.clamp(0.0, 1.0) * 100.0).round() as u8;
        if percent != self.progress_percent {
            debug!("scene: progress {}%", percent);
            self.progress_percent = percent;
        }
    }

    fn set_progress_visible(&mut self, visible: bool) {
        if self.progress_visible != visible {
            debug!("scene: progress bar {}", if visible { "shown" } else { "hidden" });
            self.progress_visible = visible;
        }
    }

    fn set_buttons_visible(&mut self, visible: bool) {
        if self.buttons_visible != visible {
            debug!("scene: buttons {}", if visible { "shown" } else { "hidden" });
            self.buttons_visible = visible;
        }
    }

    fn set_play_icon(&mut self, icon: PlayIcon) {
        if self.icon != icon {
            debug!("scene: play button shows {:?}", icon);
            self.icon = icon;
        }
    }

    fn set_brightness(&mut self, level: u16) {
        if level > MAX_BRIGHTNESS {
            error!(
                "scene: brightness {} out of range 0..={}, ignored",
                level, MAX_BRIGHTNESS
            );
            return;
        }
        if self.brightness != level {
            debug!("scene: backlight {}", level);
            self.brightness = level;
        }
    }
}

// ── refresh loop ──────────────────────────────────────────────────────────────

pub struct SceneController<C, S> {
    controller: Arc<PlaybackController<C>>,
    scene: S,
    shared: Arc<SharedState>,
    shutdown: ShutdownSignal,

    tick: Duration,
    idle_timeout: Duration,
    button_reveal: Duration,
    placeholder_title: String,
    splash_image: String,
    display: DisplayConfig,

    buttons_visible: bool,
    buttons_shown_at: Instant,
    play_icon: PlayIcon,
    idle_fired: bool,
}

impl<C: MediaClient, S: Scene> SceneController<C, S> {
    /// Puts `scene` into its boot presentation: splash, no progress, no
    /// buttons, full backlight.
    pub fn new(
        controller: Arc<PlaybackController<C>>,
        mut scene: S,
        shared: Arc<SharedState>,
        shutdown: ShutdownSignal,
        ui: &UiConfig,
        display: &DisplayConfig,
    ) -> Self {
        scene.set_background_image(&ui.splash_image);
        scene.set_progress_visible(false);
        scene.set_buttons_visible(false);
        scene.set_play_icon(PlayIcon::Play);
        scene.set_brightness(display.bright);
        shared.set_showing_splash(true);

        Self {
            controller,
            scene,
            shared,
            shutdown,
            tick: ui.tick(),
            idle_timeout: ui.idle_timeout(),
            button_reveal: ui.button_reveal(),
            placeholder_title: ui.placeholder_title.clone(),
            splash_image: ui.splash_image.clone(),
            display: display.clone(),
            buttons_visible: false,
            buttons_shown_at: Instant::now(),
            play_icon: PlayIcon::Play,
            idle_fired: false,
        }
    }

    pub fn buttons_visible(&self) -> bool {
        self.buttons_visible
    }

    /// Tick until shutdown fires.  The backlight is off on return.
    pub async fn run(&mut self, mut events: mpsc::Receiver<UiEvent>) -> ShutdownReason {
        let shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("ui: running, tick every {:?}", self.tick);
        loop {
            tokio::select! {
                biased;
                reason = shutdown.triggered() => {
                    info!("ui: stopping ({:?})", reason);
                    self.scene.set_brightness(self.display.off);
                    return reason;
                }
                Some(event) = events.recv() => self.handle_event(event).await,
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    pub async fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Click { control, button } => self.on_click(control, button).await,
            UiEvent::CardActivated(id) => self.card_activated(&id),
        }
    }

    /// One refresh.  Never fails: query errors are logged and the idle
    /// check still runs.
    pub async fn tick(&mut self) {
        let status = match self.refresh().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("ui: refresh failed: {}", e);
                None
            }
        };

        let now = Instant::now();
        self.check_idle(now);

        if self.buttons_visible {
            if let Some(status) = &status {
                self.reconcile_play_icon(status.state);
            }
            if now.saturating_duration_since(self.buttons_shown_at) > self.button_reveal {
                self.hide_buttons();
            }
        }
    }

    async fn refresh(&mut self) -> Result<PlaybackStatus, PlaybackError> {
        let status = self.controller.status().await?;
        let track = if status.state == PlaybackState::Connecting {
            CurrentTrack::default()
        } else {
            self.controller.current_track().await?
        };

        match track.title.as_deref() {
            Some(title) => self.scene.set_now_playing_title(title),
            None => self.scene.set_now_playing_title(&self.placeholder_title),
        }

        match status.state {
            PlaybackState::Playing => {
                self.shared.activity.touch();
                self.scene.set_progress(track.progress());
            }
            PlaybackState::Paused => {}
            _ => {
                if track.is_empty() && !self.shared.showing_splash() {
                    self.show_splash();
                }
            }
        }
        Ok(status)
    }

    fn check_idle(&mut self, now: Instant) {
        if self.idle_fired {
            return;
        }
        let idle = self.shared.activity.idle_for(now);
        if idle > self.idle_timeout {
            self.idle_fired = true;
            info!("ui: idle for {:?}, shutting down", idle);
            self.scene.set_brightness(self.display.off);
            self.shutdown.trigger(ShutdownReason::Idle);
        }
    }

    fn reconcile_play_icon(&mut self, state: PlaybackState) {
        let wanted = if state == PlaybackState::Playing {
            PlayIcon::Pause
        } else {
            PlayIcon::Play
        };
        if wanted != self.play_icon {
            self.scene.set_play_icon(wanted);
            self.play_icon = wanted;
        }
    }

    // ── input ─────────────────────────────────────────────────────────────────

    pub async fn on_click(&mut self, control: Control, button: PointerButton) {
        debug!("ui: click {:?} ({:?})", control, button);
        self.shared.activity.touch();
        self.buttons_shown_at = Instant::now();

        let status = match self.controller.status().await {
            Ok(status) => status,
            Err(e) => {
                error!("ui: click {:?}: status unavailable: {}", control, e);
                return;
            }
        };

        let result = match control {
            Control::PlayPause => self.controller.pause().await,
            Control::Prev if status.has_previous() => self.controller.prev().await.map(drop),
            Control::Next if status.has_next() => self.controller.next().await.map(drop),
            Control::Prev | Control::Next => {
                debug!("ui: {:?} ignored at song {:?}/{}", control, status.song, status.playlist_length);
                Ok(())
            }
            Control::Background => {
                if status.state.is_active() {
                    self.show_buttons();
                }
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("ui: click {:?} failed: {}", control, e);
        }
    }

    pub fn card_activated(&mut self, id: &str) {
        info!("ui: card activated, playlist '{}'", id);
        self.shared.activity.touch();
        self.scene.new_card_activated(id);
        self.scene.set_background_image(id);
        self.shared.set_showing_splash(false);
        self.scene.set_progress_visible(true);
        self.show_buttons();
    }

    // ── presentation ──────────────────────────────────────────────────────────

    fn show_splash(&mut self) {
        debug!("ui: nothing loaded, back to splash");
        self.scene.set_background_image(&self.splash_image);
        self.scene.set_progress_visible(false);
        self.shared.set_showing_splash(true);
        self.hide_buttons();
    }

    fn show_buttons(&mut self) {
        // the reveal window restarts even when already visible
        self.buttons_shown_at = Instant::now();
        if !self.buttons_visible {
            self.scene.set_buttons_visible(true);
            self.scene.set_brightness(self.display.bright);
            self.buttons_visible = true;
        }
    }

    fn hide_buttons(&mut self) {
        if self.buttons_visible {
            self.scene.set_buttons_visible(false);
            self.scene.set_brightness(self.display.dark);
            self.buttons_visible = false;
        }
    }
}
