//! ExclusiveConnection: the single gate in front of the mpd socket.
//!
//! The tag-reader thread, the UI tick and touch handlers all funnel through
//! `acquire()`.  The returned guard derefs to the client and releases the
//! lock when dropped, on every exit path including `?` and panics.
//!
//! Acquisition has no timeout.  A command that never returns keeps the lock
//! forever and freezes every other caller; the client's per-command I/O
//! timeout is the only thing standing between a wedged daemon and a wedged
//! appliance.

use std::ops::{Deref, DerefMut};

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::MpdError;
use crate::mpd::MediaClient;

pub struct ExclusiveConnection<C> {
    client: Mutex<C>,
    address: String,
}

impl<C: MediaClient> ExclusiveConnection<C> {
    pub fn new(client: C, address: impl Into<String>) -> Self {
        Self {
            client: Mutex::new(client),
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for exclusive use of the connection.
    pub async fn acquire(&self) -> ConnectionGuard<'_, C> {
        let client = match self.client.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("connection: busy, waiting for the current command");
                self.client.lock().await
            }
        };
        ConnectionGuard {
            client,
            address: &self.address,
        }
    }
}

/// Scoped access to the client.  Holding one is the only way to talk to mpd.
pub struct ConnectionGuard<'a, C> {
    client: MutexGuard<'a, C>,
    address: &'a str,
}

impl<C: MediaClient> ConnectionGuard<'_, C> {
    /// Dial the daemon.  A client that reports it is already connected is
    /// fine: someone else fixed the link first.
    pub async fn connect(&mut self) -> Result<(), MpdError> {
        match self.client.connect(self.address).await {
            Err(MpdError::AlreadyConnected) => {
                debug!("connection: already connected");
                Ok(())
            }
            other => other,
        }
    }

    /// Drop whatever is left of the link and dial again.
    pub async fn reconnect(&mut self) -> Result<(), MpdError> {
        self.client.disconnect();
        self.connect().await
    }

    /// Dial once if a previous command left the link broken.
    pub async fn ensure_connected(&mut self) -> Result<(), MpdError> {
        if self.client.is_connected() {
            return Ok(());
        }
        debug!("connection: link down, reconnecting to {}", self.address);
        self.connect().await
    }
}

impl<C> Deref for ConnectionGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C> DerefMut for ConnectionGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.client
    }
}
