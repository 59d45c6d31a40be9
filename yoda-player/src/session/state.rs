//! Session record
//!
//! The single process-wide record of what is playing. It holds no timers and
//! performs no I/O; the controller drives it and acts on what it returns.

use crate::backend::NowPlaying;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// The tag currently considered playing
#[derive(Debug, Clone)]
pub struct ActivePlay {
    pub track_id: String,
    pub session_id: Uuid,
    /// When the session began (not reset by re-scans)
    pub session_started_at: Instant,
    /// When the current unaccounted segment began; reset by each re-scan
    pub started_at: Instant,
    /// Seconds already credited to the track
    pub flushed_seconds: f64,
    pub now_playing: Option<NowPlaying>,
}

#[derive(Debug, Clone, Default)]
pub enum PlayState {
    #[default]
    Idle,
    Playing(ActivePlay),
}

/// A session that just ended
#[derive(Debug, Clone, PartialEq)]
pub struct EndedPlay {
    pub track_id: String,
    pub session_id: Uuid,
    /// Seconds since the last flush, not yet credited
    pub tail_seconds: f64,
    /// Seconds across the whole session, tail included
    pub total_seconds: f64,
}

#[derive(Debug, Default)]
pub struct Session {
    state: PlayState,
    can_start_at: Option<Instant>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlayState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActivePlay> {
        match &self.state {
            PlayState::Playing(play) => Some(play),
            PlayState::Idle => None,
        }
    }

    pub fn active_mut(&mut self) -> Option<&mut ActivePlay> {
        match &mut self.state {
            PlayState::Playing(play) => Some(play),
            PlayState::Idle => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayState::Playing(_))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active().map(|play| play.track_id.as_str())
    }

    pub fn can_start_at(&self) -> Option<Instant> {
        self.can_start_at
    }

    /// True while a stop's cooldown still forbids new starts
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.can_start_at.is_some_and(|t| now < t)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.can_start_at
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Mark `track_id` as playing from `now`; returns the new session id
    ///
    /// Callers end any previous session first.
    pub fn begin(&mut self, track_id: &str, now: Instant) -> Uuid {
        let session_id = Uuid::new_v4();
        self.state = PlayState::Playing(ActivePlay {
            track_id: track_id.to_string(),
            session_id,
            session_started_at: now,
            started_at: now,
            flushed_seconds: 0.0,
            now_playing: None,
        });
        session_id
    }

    /// Credit time since the last flush and restart the segment at `now`
    ///
    /// Returns the seconds credited, or None when idle.
    pub fn flush_elapsed(&mut self, now: Instant) -> Option<f64> {
        let play = self.active_mut()?;
        let elapsed = now.saturating_duration_since(play.started_at).as_secs_f64();
        play.flushed_seconds += elapsed;
        play.started_at = now;
        Some(elapsed)
    }

    /// End the current session and start the cooldown
    ///
    /// Returns None (and leaves the cooldown alone) when idle.
    pub fn end(&mut self, now: Instant, cooldown: Duration) -> Option<EndedPlay> {
        let tail_seconds = self.flush_elapsed(now)?;
        let PlayState::Playing(play) = std::mem::take(&mut self.state) else {
            return None;
        };
        self.can_start_at = Some(now + cooldown);

        Some(EndedPlay {
            track_id: play.track_id,
            session_id: play.session_id,
            tail_seconds,
            total_seconds: play.flushed_seconds,
        })
    }

    pub fn lift_cooldown(&mut self) {
        self.can_start_at = None;
    }
}
