//! Playback session controller
//!
//! One task owns the [`Session`] and both timer slots. Scans, timer expiries,
//! backend completions, snapshot queries and shutdown all arrive as events and
//! are handled one at a time by [`ControllerLoop`], so every transition sees a
//! consistent session without any lock being held across I/O. Backend work is
//! only ever enqueued here; the [`BackendHandle`] worker executes it.

use super::state::{EndedPlay, Session};
use super::timer::{TimerKind, TimerSlot};
use crate::backend::{BackendHandle, BackendReport, NowPlaying};
use crate::catalog::{Catalog, TrackEntry};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::metrics::PlaybackMetrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use yoda_common::events::{RejectReason, StopReason, YodaEvent};
use yoda_common::{time, EventBus};

/// Upper bound on waiting for the backend to drain at shutdown
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Arbitration timings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub inactivity_timeout: Duration,
    pub cooldown: Duration,
    pub stop_tag: Option<String>,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout(),
            cooldown: config.cooldown(),
            stop_tag: config.stop_tag.clone(),
        }
    }
}

/// Result of one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Playback started; `displaced` names the tag that was interrupted
    Started {
        session_id: Uuid,
        displaced: Option<String>,
    },
    /// The active tag was re-scanned and its session extended
    AlreadyPlaying,
    UnknownId,
    /// A stop happened less than the cooldown ago
    Cooldown,
    /// The stop tag was scanned; `stopped` is false when nothing was playing
    StopTag { stopped: bool },
}

impl ScanOutcome {
    pub fn started(&self) -> bool {
        matches!(self, ScanOutcome::Started { .. })
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ScanOutcome::Started { .. } => "started",
            ScanOutcome::AlreadyPlaying => "already-playing",
            ScanOutcome::UnknownId => RejectReason::UnknownId.as_str(),
            ScanOutcome::Cooldown => RejectReason::Cooldown.as_str(),
            ScanOutcome::StopTag { .. } => StopReason::StopTag.as_str(),
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// "idle" or "playing"
    pub state: &'static str,
    pub active_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub playing_for_seconds: Option<f64>,
    pub cooldown_remaining_ms: u64,
    pub now_playing: Option<NowPlaying>,
}

enum ControlEvent {
    Scan {
        id: String,
        reply: oneshot::Sender<ScanOutcome>,
    },
    TimerFired {
        kind: TimerKind,
        generation: u64,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the controller task
///
/// Cheap to clone; all clones feed the same event queue.
#[derive(Clone)]
pub struct SessionController {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl SessionController {
    /// Spawn the controller task
    ///
    /// `reports` is the completion channel of the backend worker behind
    /// `backend`.
    pub fn spawn(
        catalog: Arc<Catalog>,
        backend: BackendHandle,
        reports: mpsc::UnboundedReceiver<BackendReport>,
        metrics: Arc<PlaybackMetrics>,
        events: EventBus,
        settings: SessionSettings,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = ControllerLoop {
            session: Session::new(),
            inactivity: TimerSlot::new(TimerKind::Inactivity),
            cooldown: TimerSlot::new(TimerKind::Cooldown),
            self_tx: tx.downgrade(),
            catalog,
            backend,
            metrics,
            events,
            settings,
        };
        let task = tokio::spawn(controller.run(rx, reports));
        (Self { tx }, task)
    }

    /// Arbitrate one scanned tag id
    pub async fn handle_scan(&self, id: impl Into<String>) -> Result<ScanOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlEvent::Scan {
                id: id.into(),
                reply,
            })
            .map_err(|_| Error::ControllerClosed)?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlEvent::Snapshot { reply })
            .map_err(|_| Error::ControllerClosed)?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }

    /// Cancel timers, stop playback and wait for the backend to drain
    ///
    /// Later calls on any clone return [`Error::ControllerClosed`].
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlEvent::Shutdown { reply })
            .map_err(|_| Error::ControllerClosed)?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }
}

struct ControllerLoop {
    session: Session,
    inactivity: TimerSlot,
    cooldown: TimerSlot,
    self_tx: mpsc::WeakUnboundedSender<ControlEvent>,
    catalog: Arc<Catalog>,
    backend: BackendHandle,
    metrics: Arc<PlaybackMetrics>,
    events: EventBus,
    settings: SessionSettings,
}

impl ControllerLoop {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ControlEvent>,
        mut reports: mpsc::UnboundedReceiver<BackendReport>,
    ) {
        info!(
            "Session controller started (inactivity {:?}, cooldown {:?})",
            self.settings.inactivity_timeout, self.settings.cooldown
        );
        let mut reports_open = true;

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(ControlEvent::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(ControlEvent::Scan { id, reply }) => {
                        let outcome = self.handle_scan(id, Instant::now());
                        self.metrics.record_scan(outcome.reason());
                        let _ = reply.send(outcome);
                    }
                    Some(ControlEvent::TimerFired { kind, generation }) => {
                        self.on_timer(kind, generation, Instant::now());
                    }
                    Some(ControlEvent::Snapshot { reply }) => {
                        let _ = reply.send(self.snapshot(Instant::now()));
                    }
                    None => {
                        // Every handle dropped without an explicit shutdown
                        self.shutdown().await;
                        break;
                    }
                },
                report = reports.recv(), if reports_open => match report {
                    Some(report) => self.handle_report(report),
                    None => {
                        warn!("Backend worker exited; backend reports unavailable");
                        reports_open = false;
                    }
                },
            }
        }

        info!("Session controller stopped");
    }

    fn on_timer(&mut self, kind: TimerKind, generation: u64, now: Instant) {
        match kind {
            TimerKind::Inactivity => self.on_inactivity_expired(generation, now),
            TimerKind::Cooldown => self.on_cooldown_expired(generation, now),
        }
    }

    fn handle_scan(&mut self, id: String, now: Instant) -> ScanOutcome {
        if self.settings.stop_tag.as_deref() == Some(id.as_str()) {
            let stopped = self.stop_session(now, StopReason::StopTag).is_some();
            info!("Stop tag scanned (session {})", if stopped { "stopped" } else { "idle" });
            return ScanOutcome::StopTag { stopped };
        }

        let Some(entry) = self.catalog.lookup(&id).cloned() else {
            warn!("Scan for unknown id '{}'", id);
            self.emit_rejected(id, RejectReason::UnknownId);
            return ScanOutcome::UnknownId;
        };

        let active = self.session.active_id().map(str::to_owned);
        match active.as_deref() {
            Some(active) if active == id => {
                self.continue_session(now);
                ScanOutcome::AlreadyPlaying
            }
            Some(_) => {
                let displaced = self
                    .stop_session(now, StopReason::Displaced)
                    .map(|ended| ended.track_id);
                self.start_session(&id, &entry, now, displaced)
            }
            None if self.session.in_cooldown(now) => {
                debug!(
                    "Rejecting '{}': cooldown for another {:?}",
                    id,
                    self.session.cooldown_remaining(now)
                );
                self.emit_rejected(id, RejectReason::Cooldown);
                ScanOutcome::Cooldown
            }
            None => self.start_session(&id, &entry, now, None),
        }
    }

    fn start_session(
        &mut self,
        id: &str,
        entry: &TrackEntry,
        now: Instant,
        displaced: Option<String>,
    ) -> ScanOutcome {
        let session_id = self.session.begin(id, now);

        if !self.backend.start(session_id, id, &entry.file, entry.offset_seconds) {
            self.backend_unavailable("start", Some(session_id));
        }
        self.arm_inactivity();
        self.metrics.record_play(id);

        info!(
            "Playing '{}' ({} from {}s){}",
            id,
            entry.file,
            entry.offset_seconds,
            displaced
                .as_deref()
                .map(|d| format!(", displacing '{}'", d))
                .unwrap_or_default()
        );
        self.events.emit_lossy(YodaEvent::PlaybackStarted {
            session_id,
            track_id: id.to_string(),
            file: entry.file.clone(),
            offset_seconds: entry.offset_seconds,
            displaced: displaced.clone(),
            timestamp: time::now(),
        });

        ScanOutcome::Started {
            session_id,
            displaced,
        }
    }

    fn continue_session(&mut self, now: Instant) {
        let Some(seconds) = self.session.flush_elapsed(now) else {
            return;
        };
        let Some(play) = self.session.active() else {
            return;
        };
        let (track_id, session_id) = (play.track_id.clone(), play.session_id);

        self.metrics.record_duration(&track_id, seconds);
        self.arm_inactivity();

        debug!("'{}' re-scanned, credited {:.3}s", track_id, seconds);
        self.events.emit_lossy(YodaEvent::PlaybackContinued {
            session_id,
            track_id,
            seconds_flushed: seconds,
            timestamp: time::now(),
        });
    }

    /// Shared stop sequence; a no-op when idle
    fn stop_session(&mut self, now: Instant, reason: StopReason) -> Option<EndedPlay> {
        let ended = self.session.end(now, self.settings.cooldown)?;

        if !self.backend.stop(ended.session_id, &ended.track_id) {
            self.backend_unavailable("stop", Some(ended.session_id));
        }
        self.metrics.record_duration(&ended.track_id, ended.tail_seconds);
        self.inactivity.cancel();
        self.arm_cooldown();

        info!(
            "Stopped '{}' after {:.1}s ({})",
            ended.track_id, ended.total_seconds, reason
        );
        self.events.emit_lossy(YodaEvent::PlaybackStopped {
            session_id: ended.session_id,
            track_id: ended.track_id.clone(),
            reason,
            seconds_played: ended.total_seconds,
            timestamp: time::now(),
        });
        Some(ended)
    }

    fn on_inactivity_expired(&mut self, generation: u64, now: Instant) {
        if !self.inactivity.accept(generation) {
            debug!("Ignoring stale inactivity expiry");
            return;
        }
        // Always refers to the current occupant; harmless when idle
        self.stop_session(now, StopReason::Inactivity);
    }

    fn on_cooldown_expired(&mut self, generation: u64, now: Instant) {
        if !self.cooldown.accept(generation) {
            debug!("Ignoring stale cooldown expiry");
            return;
        }
        self.session.lift_cooldown();
        debug!("Cooldown lifted");
        self.events.emit_lossy(YodaEvent::CooldownLifted {
            timestamp: time::now(),
        });

        let overdue = self
            .session
            .active()
            .map(|play| now.saturating_duration_since(play.started_at))
            .filter(|idle| *idle >= self.settings.inactivity_timeout);
        if let Some(idle) = overdue {
            warn!(
                "Session still active {:?} after its last scan; stopping",
                idle
            );
            self.stop_session(now, StopReason::Defensive);
        }
    }

    fn handle_report(&mut self, report: BackendReport) {
        match report {
            BackendReport::Started {
                session_id,
                track_id,
                now_playing,
            } => {
                debug!("Backend confirmed start of '{}'", track_id);
                let Some(song) = now_playing else {
                    return;
                };
                if let Some(title) = &song.title {
                    self.metrics.record_episode(title);
                }
                if let Some(play) = self
                    .session
                    .active_mut()
                    .filter(|play| play.session_id == session_id)
                {
                    play.now_playing = Some(song);
                }
            }
            BackendReport::Stopped { track_id, .. } => {
                debug!("Backend confirmed stop of '{}'", track_id);
            }
            BackendReport::Failed {
                session_id,
                track_id,
                command,
                message,
            } => {
                // Bookkeeping stays authoritative; the device may now be out of sync
                error!("Backend {} failed for '{}': {}", command, track_id, message);
                self.metrics.record_play_error();
                self.events.emit_lossy(YodaEvent::BackendFailed {
                    command: command.to_string(),
                    message,
                    session_id: Some(session_id),
                    timestamp: time::now(),
                });
            }
        }
    }

    fn snapshot(&self, now: Instant) -> SessionSnapshot {
        let active = self.session.active();
        SessionSnapshot {
            state: if active.is_some() { "playing" } else { "idle" },
            active_id: active.map(|play| play.track_id.clone()),
            session_id: active.map(|play| play.session_id),
            playing_for_seconds: active.map(|play| {
                now.saturating_duration_since(play.session_started_at)
                    .as_secs_f64()
            }),
            cooldown_remaining_ms: time::duration_to_millis(self.session.cooldown_remaining(now)),
            now_playing: active.and_then(|play| play.now_playing.clone()),
        }
    }

    async fn shutdown(&mut self) {
        info!("Session controller shutting down");
        self.inactivity.cancel();
        self.cooldown.cancel();

        if let Some(ended) = self.session.end(Instant::now(), Duration::ZERO) {
            if !self.backend.stop(ended.session_id, &ended.track_id) {
                self.backend_unavailable("stop", Some(ended.session_id));
            }
            self.metrics.record_duration(&ended.track_id, ended.tail_seconds);
            info!("Stopped '{}' for shutdown", ended.track_id);
            self.events.emit_lossy(YodaEvent::PlaybackStopped {
                session_id: ended.session_id,
                track_id: ended.track_id,
                reason: StopReason::Shutdown,
                seconds_played: ended.total_seconds,
                timestamp: time::now(),
            });
        }

        if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, self.backend.flush())
            .await
            .is_err()
        {
            warn!("Backend did not drain within {:?}", SHUTDOWN_DRAIN_TIMEOUT);
        }
    }

    fn arm_inactivity(&mut self) {
        self.inactivity.arm(
            self.settings.inactivity_timeout,
            &self.self_tx,
            |kind, generation| ControlEvent::TimerFired { kind, generation },
        );
    }

    fn arm_cooldown(&mut self) {
        self.cooldown.arm(
            self.settings.cooldown,
            &self.self_tx,
            |kind, generation| ControlEvent::TimerFired { kind, generation },
        );
    }

    fn emit_rejected(&self, track_id: String, reason: RejectReason) {
        self.events.emit_lossy(YodaEvent::ScanRejected {
            track_id,
            reason,
            timestamp: time::now(),
        });
    }

    fn backend_unavailable(&self, command: &'static str, session_id: Option<Uuid>) {
        error!("Backend worker is gone; {} not delivered", command);
        self.metrics.record_play_error();
        self.events.emit_lossy(YodaEvent::BackendFailed {
            command: command.to_string(),
            message: "backend worker stopped".to_string(),
            session_id,
            timestamp: time::now(),
        });
    }
}
