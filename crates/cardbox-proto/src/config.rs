use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mpd: MpdConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection to the music player daemon and the policy around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpdConfig {
    #[serde(default = "default_mpd_host")]
    pub host: String,
    #[serde(default = "default_mpd_port")]
    pub port: u16,
    /// Upper bound for a single command round-trip on the socket.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Pause between connection attempts while waiting for mpd at boot.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    /// Total attempts for one playlist start when the connection drops.
    #[serde(default = "default_play_attempts")]
    pub play_attempts: u32,
    /// Ask mpd to rescan the music directory at startup.
    #[serde(default = "default_update_on_start")]
    pub update_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Reads of a tag are suppressed for this long after it triggered playback,
    /// and a tag sighted again within this window counts as still present.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Older images of the appliance used 120s here.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_button_reveal_secs")]
    pub button_reveal_secs: u64,
    /// Shown in the now-playing label when the current song has no title.
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,
    #[serde(default = "default_splash_image")]
    pub splash_image: String,
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
}

/// Backlight PWM duty cycles, 0 (off) ..= 1023 (full).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_bright")]
    pub bright: u16,
    #[serde(default = "default_dark")]
    pub dark: u16,
    #[serde(default = "default_off")]
    pub off: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Power the machine off after an idle shutdown. Signals never do.
    #[serde(default = "default_power_off_on_idle")]
    pub power_off_on_idle: bool,
    #[serde(default = "default_power_command")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: default_mpd_host(),
            port: default_mpd_port(),
            command_timeout_secs: default_command_timeout_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            play_attempts: default_play_attempts(),
            update_on_start: default_update_on_start(),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            button_reveal_secs: default_button_reveal_secs(),
            placeholder_title: default_placeholder_title(),
            splash_image: default_splash_image(),
            images_dir: default_images_dir(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bright: default_bright(),
            dark: default_dark(),
            off: default_off(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            power_off_on_idle: default_power_off_on_idle(),
            command: default_power_command(),
        }
    }
}

impl MpdConfig {
    pub fn address(&self) -> String {
        platform::mpd_address(&self.host, self.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl UiConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn button_reveal(&self) -> Duration {
        Duration::from_secs(self.button_reveal_secs)
    }
}

fn default_mpd_host() -> String {
    platform::DEFAULT_MPD_HOST.to_string()
}

fn default_mpd_port() -> u16 {
    platform::DEFAULT_MPD_PORT
}

fn default_command_timeout_secs() -> u64 {
    10
}

fn default_reconnect_backoff_secs() -> u64 {
    10
}

fn default_play_attempts() -> u32 {
    3
}

fn default_update_on_start() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_tick_ms() -> u64 {
    // pygame-era UI redrew at ~25 fps; status polling does not need more than 10
    100
}

fn default_idle_timeout_secs() -> u64 {
    180
}

fn default_button_reveal_secs() -> u64 {
    5
}

fn default_placeholder_title() -> String {
    "♫".to_string()
}

fn default_splash_image() -> String {
    "splash".to_string()
}

fn default_images_dir() -> PathBuf {
    platform::images_dir()
}

fn default_bright() -> u16 {
    500
}

fn default_dark() -> u16 {
    150
}

fn default_off() -> u16 {
    20
}

fn default_power_off_on_idle() -> bool {
    true
}

fn default_power_command() -> Vec<String> {
    ["/usr/bin/sudo", "/sbin/shutdown", "-h", "now"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
