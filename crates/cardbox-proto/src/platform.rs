use std::path::PathBuf;

pub const DEFAULT_MPD_HOST: &str = "localhost";
pub const DEFAULT_MPD_PORT: u16 = 6600;

pub fn mpd_address(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

pub fn config_dir() -> PathBuf {
    // Always ~/.config/cardbox/, the appliance runs as a plain user on Linux
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("cardbox")
}

/// Directory holding the splash and per-card background images.
/// The music library lives beside it on the appliance image.
pub fn images_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("music")
        .join("images")
}
