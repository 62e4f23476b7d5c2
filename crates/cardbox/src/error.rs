use thiserror::Error;

/// Failures talking to mpd.
#[derive(Debug, Error)]
pub enum MpdError {
    #[error("mpd I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mpd connection closed")]
    Closed,
    #[error("not connected to mpd")]
    NotConnected,
    #[error("already connected to mpd")]
    AlreadyConnected,
    #[error("mpd did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("mpd protocol violation: {0}")]
    Protocol(String),
    /// `ACK [code@index] {command} message`: mpd understood and refused.
    #[error("mpd rejected '{command}' (code {code}): {message}")]
    Ack {
        code: u32,
        command: String,
        message: String,
    },
}

impl MpdError {
    /// True when the link itself is gone or untrustworthy and a reconnect
    /// may help.  Rejections and benign reconnect races are not.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MpdError::Io(_)
                | MpdError::Closed
                | MpdError::NotConnected
                | MpdError::Timeout(_)
                | MpdError::Protocol(_)
        )
    }
}

/// Failures from the tag-reader hardware.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Nothing in the field.  The normal idle answer, not worth logging.
    #[error("no tag present")]
    NoTag,
    #[error("tag reader error: {0}")]
    Hardware(String),
}

/// What callers of the playback controller see.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Mpd(#[from] MpdError),
    #[error("playlist '{playlist}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        playlist: String,
        attempts: u32,
        #[source]
        source: MpdError,
    },
}
