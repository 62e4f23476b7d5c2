//! TagActivationLoop: scans for cards on a dedicated thread and turns each
//! new card into a playlist selection.
//!
//! ```text
//!   Idle ──(uid read)──► TagPresent ──(play issued)──► Cooldown ──(window)──► Idle
//!    ▲  └─(nothing)─┘
//! ```
//!
//! The reader driver is blocking SPI, so the loop owns a plain OS thread and
//! enters the async controller through the runtime handle.  `terminate()` is
//! the rendezvous: it wakes the thread, waits for it to release the reader
//! and join.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cardbox_proto::config::ReaderConfig;
use cardbox_proto::protocol::{PlaylistSelection, TagId};
use tracing::{debug, error, info, warn};

use crate::activity::SharedState;
use crate::error::ReaderError;
use crate::mpd::MediaClient;
use crate::player::{PlayOutcome, PlaybackController};

/// Card reader hardware.  Methods block for at most a few milliseconds.
pub trait TagReader: Send + 'static {
    /// Scan the field.  `Ok` carries the card type answer; an empty field
    /// is `Err(ReaderError::NoTag)`.
    fn request_scan(&mut self) -> Result<u16, ReaderError>;
    /// Anti-collision read of the UID of the card that answered.
    fn read_uid(&mut self) -> Result<TagId, ReaderError>;
    /// Release the device.  Called exactly once, from the loop thread.
    fn cleanup(&mut self);
}

// ── debounce ──────────────────────────────────────────────────────────────────

/// Remembers the card that is resting on the reader.  A card only counts
/// as removed after enough consecutive empty polls to cover the window, so
/// a card held in place triggers once however long it stays.
#[derive(Debug)]
pub struct Debouncer {
    present: Option<TagId>,
    misses: u32,
    misses_to_forget: u32,
}

impl Debouncer {
    pub fn new(poll_interval: Duration, window: Duration) -> Self {
        let poll_ms = poll_interval.as_millis().max(1);
        let misses = window.as_millis().div_ceil(poll_ms).max(1);
        Self {
            present: None,
            misses: 0,
            misses_to_forget: u32::try_from(misses).unwrap_or(u32::MAX),
        }
    }

    /// A card was read.  True if it is a new arrival.
    pub fn sighted(&mut self, tag: TagId) -> bool {
        self.misses = 0;
        if self.present == Some(tag) {
            return false;
        }
        self.present = Some(tag);
        true
    }

    /// A poll found nothing.
    pub fn missed(&mut self) {
        if self.present.is_none() {
            return;
        }
        self.misses += 1;
        if self.misses >= self.misses_to_forget {
            debug!("tag reader: card {:?} removed", self.present);
            self.present = None;
            self.misses = 0;
        }
    }

    pub fn present(&self) -> Option<TagId> {
        self.present
    }
}

// ── loop ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    TagPresent(TagId),
    Cooldown,
}

struct Scanner<R, F> {
    reader: R,
    on_tag: F,
    shared: Arc<SharedState>,
    debouncer: Debouncer,
    poll_interval: Duration,
    cooldown: Duration,
    terminated: Arc<AtomicBool>,
    wake_rx: mpsc::Receiver<()>,
}

impl<R, F> Scanner<R, F>
where
    R: TagReader,
    F: FnMut(PlaylistSelection),
{
    fn run(mut self) {
        info!("tag reader: scanning");
        let mut state = ScanState::Idle;
        loop {
            if self.terminated.load(Ordering::Acquire) {
                break;
            }
            state = match state {
                ScanState::Idle => match self.scan() {
                    Some(tag) => ScanState::TagPresent(tag),
                    None => {
                        self.debouncer.missed();
                        if self.sleep(self.poll_interval) {
                            break;
                        }
                        ScanState::Idle
                    }
                },
                ScanState::TagPresent(tag) => {
                    if self.debouncer.sighted(tag) {
                        info!("tag reader: card {}", tag);
                        self.shared.activity.touch();
                        (self.on_tag)(PlaylistSelection::from_tag(tag));
                    } else {
                        debug!("tag reader: card {} still present", tag);
                    }
                    ScanState::Cooldown
                }
                ScanState::Cooldown => {
                    if self.sleep(self.cooldown) {
                        break;
                    }
                    ScanState::Idle
                }
            };
        }
        self.reader.cleanup();
        info!("tag reader: stopped, reader released");
    }

    fn scan(&mut self) -> Option<TagId> {
        match self.reader.request_scan() {
            Ok(kind) => debug!("tag reader: detected type {:#06x}", kind),
            Err(ReaderError::NoTag) => return None,
            Err(e) => {
                warn!("tag reader: request failed: {}", e);
                return None;
            }
        }
        match self.reader.read_uid() {
            Ok(tag) => Some(tag),
            Err(ReaderError::NoTag) => None,
            Err(e) => {
                warn!("tag reader: uid read failed: {}", e);
                None
            }
        }
    }

    /// Interruptible sleep.  True when the loop should stop.
    fn sleep(&self, duration: Duration) -> bool {
        match self.wake_rx.recv_timeout(duration) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => self.terminated.load(Ordering::Acquire),
        }
    }
}

/// Handle to the running scanner thread.
pub struct TagActivationLoop {
    terminated: Arc<AtomicBool>,
    wake_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TagActivationLoop {
    /// Scan with `reader` and start every new card's playlist on `controller`.
    pub fn spawn<C, R>(
        reader: R,
        controller: Arc<PlaybackController<C>>,
        shared: Arc<SharedState>,
        config: &ReaderConfig,
        runtime: tokio::runtime::Handle,
    ) -> std::io::Result<Self>
    where
        C: MediaClient + 'static,
        R: TagReader,
    {
        Self::spawn_with(reader, shared, config, move |selection| {
            let id = selection.id.clone();
            match runtime.block_on(controller.play(selection)) {
                PlayOutcome::Started => debug!("tag reader: '{}' started", id),
                PlayOutcome::AlreadyPlaying => debug!("tag reader: '{}' already playing", id),
                PlayOutcome::Failed(e) => error!("tag reader: '{}' failed: {}", id, e),
            }
        })
    }

    /// Scan with `reader` and hand each new card to `on_tag`.
    pub fn spawn_with<R, F>(
        reader: R,
        shared: Arc<SharedState>,
        config: &ReaderConfig,
        on_tag: F,
    ) -> std::io::Result<Self>
    where
        R: TagReader,
        F: FnMut(PlaylistSelection) + Send + 'static,
    {
        let terminated = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = mpsc::channel();
        let scanner = Scanner {
            reader,
            on_tag,
            shared,
            debouncer: Debouncer::new(config.poll_interval(), config.debounce()),
            poll_interval: config.poll_interval(),
            cooldown: config.debounce(),
            terminated: terminated.clone(),
            wake_rx,
        };
        let thread = std::thread::Builder::new()
            .name("tag-reader".to_string())
            .spawn(move || scanner.run())?;

        Ok(Self {
            terminated,
            wake_tx: Some(wake_tx),
            thread: Some(thread),
        })
    }

    /// Stop scanning and wait until the reader has been released.  A `play`
    /// already in progress finishes first.  Idempotent.
    pub fn terminate(&mut self) {
        self.terminated.store(true, Ordering::Release);
        if let Some(tx) = self.wake_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("tag reader: thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for TagActivationLoop {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ── line reader ───────────────────────────────────────────────────────────────

/// Reads dotted UIDs from a text stream, one tap per line.  Stands in for
/// the RC522 on a development machine: `echo 1.2.3.4 > /proc/<pid>/fd/0`.
pub struct LineReader {
    taps: mpsc::Receiver<TagId>,
    pending: Option<TagId>,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self::from_reader(std::io::stdin())
    }

    pub fn from_reader<T: std::io::Read + Send + 'static>(input: T) -> Self {
        let (tx, taps) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("tag-input".to_string())
            .spawn(move || {
                for line in std::io::BufReader::new(input).lines() {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<TagId>() {
                        Ok(tag) => {
                            if tx.send(tag).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("tag input: {}", e),
                    }
                }
            });
        if let Err(e) = spawned {
            error!("tag input: could not start reader thread: {}", e);
        }
        Self {
            taps,
            pending: None,
        }
    }
}

impl TagReader for LineReader {
    fn request_scan(&mut self) -> Result<u16, ReaderError> {
        if self.pending.is_none() {
            self.pending = self.taps.try_recv().ok();
        }
        match self.pending {
            // ATQA of a MIFARE Classic 1K
            Some(_) => Ok(0x0004),
            None => Err(ReaderError::NoTag),
        }
    }

    fn read_uid(&mut self) -> Result<TagId, ReaderError> {
        self.pending.take().ok_or(ReaderError::NoTag)
    }

    fn cleanup(&mut self) {
        debug!("tag input: closed");
    }
}
