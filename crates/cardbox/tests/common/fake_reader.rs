use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cardbox::error::ReaderError;
use cardbox::reader::TagReader;
use cardbox_proto::protocol::TagId;

#[derive(Default)]
struct Field {
    card: Option<TagId>,
    hardware_errors: u32,
}

/// Reader whose field is controlled by the test: put a card down, lift it,
/// make the next reads fail.
#[derive(Clone, Default)]
pub struct FakeReader {
    field: Arc<Mutex<Field>>,
    scans: Arc<AtomicUsize>,
    cleanups: Arc<AtomicUsize>,
}

impl FakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&self, tag: TagId) {
        self.field.lock().unwrap().card = Some(tag);
    }

    pub fn lift(&self) {
        self.field.lock().unwrap().card = None;
    }

    pub fn fail_reads(&self, times: u32) {
        self.field.lock().unwrap().hardware_errors = times;
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

impl TagReader for FakeReader {
    fn request_scan(&mut self) -> Result<u16, ReaderError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let mut field = self.field.lock().unwrap();
        if field.hardware_errors > 0 {
            field.hardware_errors -= 1;
            return Err(ReaderError::Hardware("crc mismatch".to_string()));
        }
        match field.card {
            Some(_) => Ok(0x0004),
            None => Err(ReaderError::NoTag),
        }
    }

    fn read_uid(&mut self) -> Result<TagId, ReaderError> {
        self.field.lock().unwrap().card.ok_or(ReaderError::NoTag)
    }

    fn cleanup(&mut self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}
