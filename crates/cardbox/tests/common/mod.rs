#![allow(dead_code, unused_imports)]

pub mod fake_daemon;
pub mod fake_reader;
pub mod recording_scene;

use std::sync::Arc;
use std::time::Duration;

use cardbox::player::{PlaybackController, RetryPolicy};

pub use fake_daemon::{FakeDaemon, FakeState, Fault};
pub use fake_reader::FakeReader;
pub use recording_scene::{RecordingScene, SceneCall};

/// Controller over a fresh fake daemon that already has `playlists`.
pub fn controller_with(
    playlists: &[(&str, usize)],
) -> (Arc<PlaybackController<FakeDaemon>>, FakeState) {
    let (daemon, state) = FakeDaemon::new();
    for (name, tracks) in playlists {
        state.add_playlist(name, *tracks);
    }
    let policy = RetryPolicy {
        play_attempts: 3,
        reconnect_backoff: Duration::from_millis(10),
        update_on_start: true,
    };
    (
        Arc::new(PlaybackController::new(daemon, "fake:6600", policy)),
        state,
    )
}
