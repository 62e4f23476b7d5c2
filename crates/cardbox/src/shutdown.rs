//! Shutdown rendezvous: one trigger, many waiters.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Nothing happened for longer than the idle timeout.  Powers off.
    Idle,
    /// SIGINT / SIGTERM.  Leaves the machine running.
    Signal,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.  Returns false if it had already fired; the first
    /// reason wins.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the signal has fired (immediately if it already has).
    pub async fn triggered(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // sender lives in self, cannot be dropped while we wait
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Route SIGINT and SIGTERM into `signal`.
pub fn spawn_signal_listener(signal: ShutdownSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => error!("Received SIGINT, shutting down"),
            _ = terminate => error!("Received SIGTERM, shutting down"),
        }
        signal.trigger(ShutdownReason::Signal);
    })
}

/// Spawn the configured power-off command and wait for it.
pub async fn power_off(command: &[String]) -> anyhow::Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("power-off command is empty"))?;

    info!("powering off: {}", command.join(" "));
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        warn!(
            "power-off command exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        anyhow::bail!("power-off command failed: {}", output.status);
    }
    Ok(())
}
