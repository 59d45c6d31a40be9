//! Backend worker task
//!
//! Owns the [`PlayerBackend`] and executes queued commands strictly in the
//! order they were sent, so a stop enqueued before a start always reaches the
//! player first. The controller enqueues and moves on; completions come back
//! as [`BackendReport`]s on a separate channel.

use super::{BackendError, NowPlaying, PlayerBackend, PlayerStatus};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Work item for the backend worker
#[derive(Debug)]
pub enum BackendCommand {
    Start {
        session_id: Uuid,
        track_id: String,
        path: String,
        offset_seconds: f64,
    },
    Stop {
        session_id: Uuid,
        track_id: String,
    },
    Status {
        reply: oneshot::Sender<Result<PlayerStatus, BackendError>>,
    },
    /// Answered once every previously queued command has finished
    Flush { reply: oneshot::Sender<()> },
}

/// Completion of a start or stop command
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReport {
    Started {
        session_id: Uuid,
        track_id: String,
        now_playing: Option<NowPlaying>,
    },
    Stopped {
        session_id: Uuid,
        track_id: String,
    },
    Failed {
        session_id: Uuid,
        track_id: String,
        /// "start" or "stop"
        command: &'static str,
        message: String,
    },
}

/// Cloneable sender side of the worker queue
#[derive(Debug, Clone)]
pub struct BackendHandle {
    tx: mpsc::UnboundedSender<BackendCommand>,
}

impl BackendHandle {
    /// Queue a start; returns false when the worker is gone
    pub fn start(&self, session_id: Uuid, track_id: &str, path: &str, offset_seconds: f64) -> bool {
        self.tx
            .send(BackendCommand::Start {
                session_id,
                track_id: track_id.to_string(),
                path: path.to_string(),
                offset_seconds,
            })
            .is_ok()
    }

    /// Queue a stop; returns false when the worker is gone
    pub fn stop(&self, session_id: Uuid, track_id: &str) -> bool {
        self.tx
            .send(BackendCommand::Stop {
                session_id,
                track_id: track_id.to_string(),
            })
            .is_ok()
    }

    /// Ask the backend for its status (queued behind pending commands)
    pub async fn status(&self) -> Result<PlayerStatus, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BackendCommand::Status { reply })
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    /// Wait until every command queued so far has completed
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(BackendCommand::Flush { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

fn worker_gone() -> BackendError {
    BackendError::NotConnected("backend worker stopped".to_string())
}

/// Spawn the worker task that owns `backend`
///
/// The worker runs until every [`BackendHandle`] clone has been dropped.
pub fn spawn_worker(
    backend: Box<dyn PlayerBackend>,
) -> (BackendHandle, mpsc::UnboundedReceiver<BackendReport>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_worker(backend, rx, report_tx));
    (BackendHandle { tx }, report_rx, task)
}

async fn run_worker(
    mut backend: Box<dyn PlayerBackend>,
    mut rx: mpsc::UnboundedReceiver<BackendCommand>,
    reports: mpsc::UnboundedSender<BackendReport>,
) {
    info!("Backend worker started ({})", backend.name());

    while let Some(command) = rx.recv().await {
        match command {
            BackendCommand::Start {
                session_id,
                track_id,
                path,
                offset_seconds,
            } => {
                let report = match backend.start(&path, offset_seconds).await {
                    Ok(()) => {
                        let now_playing = match backend.now_playing().await {
                            Ok(song) => song,
                            Err(e) => {
                                debug!("No track metadata for {}: {}", path, e);
                                None
                            }
                        };
                        BackendReport::Started {
                            session_id,
                            track_id,
                            now_playing,
                        }
                    }
                    Err(e) => {
                        error!("{} failed to start {}: {}", backend.name(), path, e);
                        BackendReport::Failed {
                            session_id,
                            track_id,
                            command: "start",
                            message: e.to_string(),
                        }
                    }
                };
                let _ = reports.send(report);
            }
            BackendCommand::Stop {
                session_id,
                track_id,
            } => {
                let report = match backend.stop().await {
                    Ok(()) => BackendReport::Stopped {
                        session_id,
                        track_id,
                    },
                    Err(e) => {
                        error!("{} failed to stop: {}", backend.name(), e);
                        BackendReport::Failed {
                            session_id,
                            track_id,
                            command: "stop",
                            message: e.to_string(),
                        }
                    }
                };
                let _ = reports.send(report);
            }
            BackendCommand::Status { reply } => {
                let _ = reply.send(backend.status().await);
            }
            BackendCommand::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }

    info!("Backend worker stopped");
}
