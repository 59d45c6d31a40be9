//! Player backends
//!
//! The session controller drives audio through three operations: start a file
//! at an offset, stop, and query status. Two implementations exist:
//!
//! - [`mpd::MpdBackend`]: persistent control connection to a music player daemon
//! - [`process::ProcessBackend`]: one external decoder process per start
//!
//! Backends are owned by a [`worker`] task so slow I/O never runs inside the
//! controller's event loop.

pub mod mpd;
pub mod process;
pub mod worker;

use crate::config::{BackendConfig, BackendKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use worker::{spawn_worker, BackendCommand, BackendHandle, BackendReport};

/// Backend command failures
#[derive(Error, Debug)]
pub enum BackendError {
    /// Socket or process I/O failed (timeouts surface as `TimedOut`)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent something that is not valid protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Daemon rejected a command
    #[error("ACK [{code}] {{{command}}} {message}")]
    Ack {
        code: u32,
        command: String,
        message: String,
    },

    /// Decoder process could not be launched
    #[error("Failed to spawn player: {0}")]
    Spawn(String),

    /// No backend is reachable (worker stopped or connection refused)
    #[error("Backend not connected: {0}")]
    NotConnected(String),
}

impl BackendError {
    /// True when the failure leaves the underlying connection unusable
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, BackendError::Io(_) | BackendError::Protocol(_))
    }
}

/// Result of a status query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    /// Position in the current file, seconds
    pub elapsed: Option<f64>,
    pub is_playing: bool,
}

/// Tags of the file currently loaded in the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl NowPlaying {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none()
    }
}

/// Operations the session controller needs from an audio player
#[async_trait]
pub trait PlayerBackend: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Begin playing `path` from `offset_seconds`, replacing anything loaded
    async fn start(&mut self, path: &str, offset_seconds: f64) -> Result<(), BackendError>;

    /// Stop output; a no-op when nothing is playing
    async fn stop(&mut self) -> Result<(), BackendError>;

    async fn status(&mut self) -> Result<PlayerStatus, BackendError>;

    /// Metadata for the loaded file, when the backend can read it
    async fn now_playing(&mut self) -> Result<Option<NowPlaying>, BackendError> {
        Ok(None)
    }
}

/// Construct the configured backend
///
/// Neither variant touches the outside world here: the daemon connection is
/// opened on first use and processes are spawned per start.
pub fn build_backend(config: &BackendConfig) -> Box<dyn PlayerBackend> {
    match config.kind {
        BackendKind::Mpd => Box::new(mpd::MpdBackend::new(&config.mpd)),
        BackendKind::Process => Box::new(process::ProcessBackend::new(&config.process)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_backend_selects_kind() {
        let mut config = BackendConfig::default();
        assert_eq!(build_backend(&config).name(), "mpd");

        config.kind = BackendKind::Process;
        assert_eq!(build_backend(&config).name(), "process");
    }

    #[test]
    fn test_ack_display() {
        let err = BackendError::Ack {
            code: 50,
            command: "add".to_string(),
            message: "No such directory".to_string(),
        };
        assert_eq!(err.to_string(), "ACK [50] {add} No such directory");
        assert!(!err.is_connection_failure());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = PlayerStatus {
            elapsed: Some(4.5),
            is_playing: true,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isPlaying"], true);
        assert_eq!(json["elapsed"], 4.5);
    }
}
