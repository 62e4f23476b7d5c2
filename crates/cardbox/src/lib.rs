//! cardbox: tap an RFID card, hear its playlist.
//!
//! One `PlaybackController` is shared by the tag-reader thread and the UI
//! loop; every daemon command goes through its `ExclusiveConnection`.

pub mod activity;
pub mod connection;
pub mod error;
pub mod mpd;
pub mod player;
pub mod reader;
pub mod scene;
pub mod shutdown;
