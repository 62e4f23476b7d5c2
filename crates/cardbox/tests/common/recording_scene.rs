use std::sync::{Arc, Mutex};

use cardbox::scene::{PlayIcon, Scene};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCall {
    Title(String),
    CardActivated(String),
    Background(String),
    Progress(f32),
    ProgressVisible(bool),
    ButtonsVisible(bool),
    Icon(PlayIcon),
    Brightness(u16),
}

/// Scene that records every call so tests can inspect the presentation.
#[derive(Clone, Default)]
pub struct RecordingScene {
    calls: Arc<Mutex<Vec<SceneCall>>>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SceneCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, wanted: &SceneCall) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }

    pub fn last_progress(&self) -> Option<f32> {
        self.calls().iter().rev().find_map(|c| match c {
            SceneCall::Progress(p) => Some(*p),
            _ => None,
        })
    }

    pub fn last_title(&self) -> Option<String> {
        self.calls().iter().rev().find_map(|c| match c {
            SceneCall::Title(t) => Some(t.clone()),
            _ => None,
        })
    }

    pub fn last_brightness(&self) -> Option<u16> {
        self.calls().iter().rev().find_map(|c| match c {
            SceneCall::Brightness(b) => Some(*b),
            _ => None,
        })
    }

    pub fn buttons_visible(&self) -> bool {
        self.calls()
            .iter()
            .rev()
            .find_map(|c| match c {
                SceneCall::ButtonsVisible(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn push(&self, call: SceneCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Scene for RecordingScene {
    fn set_now_playing_title(&mut self, title: &str) {
        self.push(SceneCall::Title(title.to_string()));
    }

    fn new_card_activated(&mut self, id: &str) {
        self.push(SceneCall::CardActivated(id.to_string()));
    }

    fn set_background_image(&mut self, name: &str) {
        self.push(SceneCall::Background(name.to_string()));
    }

    fn set_progress(&mut self, progress: f32) {
        self.push(SceneCall::Progress(progress));
    }

    fn set_progress_visible(&mut self, visible: bool) {
        self.push(SceneCall::ProgressVisible(visible));
    }

    fn set_buttons_visible(&mut self, visible: bool) {
        self.push(SceneCall::ButtonsVisible(visible));
    }

    fn set_play_icon(&mut self, icon: PlayIcon) {
        self.push(SceneCall::Icon(icon));
    }

    fn set_brightness(&mut self, level: u16) {
        self.push(SceneCall::Brightness(level));
    }
}
