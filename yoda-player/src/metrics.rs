//! Playback metrics
//!
//! Per-track play counts and cumulative played seconds, exported in the
//! Prometheus text format on `GET /metrics`. Purely observational: nothing in
//! the session logic reads these back.

use prometheus::{CounterVec, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Accumulated observation for one tag id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackObservation {
    pub identifier: String,
    pub cumulative_seconds_played: f64,
    pub play_count: u64,
}

/// Outcome label values for `scan_requests_total`
pub const OUTCOMES: [&str; 5] = [
    "started",
    "already-playing",
    "unknown-id",
    "cooldown",
    "stop-tag",
];

pub struct PlaybackMetrics {
    registry: Registry,
    track_plays: IntCounterVec,
    track_play_duration: CounterVec,
    scan_requests: IntCounterVec,
    play_errors: IntCounter,
    episode_plays: IntCounterVec,
    observations: Mutex<HashMap<String, TrackObservation>>,
}

impl PlaybackMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let track_plays = IntCounterVec::new(
            Opts::new("track_plays_total", "Number of playback sessions started per track"),
            &["track_id"],
        )?;
        let track_play_duration = CounterVec::new(
            Opts::new(
                "track_play_duration_seconds",
                "Cumulative seconds played per track",
            ),
            &["track_id"],
        )?;
        let scan_requests = IntCounterVec::new(
            Opts::new("scan_requests_total", "Scan requests by arbitration outcome"),
            &["outcome"],
        )?;
        let play_errors = IntCounter::new("play_errors_total", "Failed player backend commands")?;
        let episode_plays = IntCounterVec::new(
            Opts::new("episode_plays_total", "Plays per episode title reported by the backend"),
            &["title"],
        )?;

        registry.register(Box::new(track_plays.clone()))?;
        registry.register(Box::new(track_play_duration.clone()))?;
        registry.register(Box::new(scan_requests.clone()))?;
        registry.register(Box::new(play_errors.clone()))?;
        registry.register(Box::new(episode_plays.clone()))?;

        // Pre-create outcome series so rates start at zero
        for outcome in OUTCOMES {
            scan_requests.with_label_values(&[outcome]);
        }

        Ok(Self {
            registry,
            track_plays,
            track_play_duration,
            scan_requests,
            play_errors,
            episode_plays,
            observations: Mutex::new(HashMap::new()),
        })
    }

    /// A new session started for `id`
    pub fn record_play(&self, id: &str) {
        self.track_plays.with_label_values(&[id]).inc();
        self.with_observation(id, |obs| obs.play_count += 1);
    }

    /// Credit `seconds` of playback to `id`
    pub fn record_duration(&self, id: &str, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        self.track_play_duration.with_label_values(&[id]).inc_by(seconds);
        self.with_observation(id, |obs| obs.cumulative_seconds_played += seconds);
    }

    pub fn record_scan(&self, outcome: &str) {
        self.scan_requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_play_error(&self) {
        self.play_errors.inc();
    }

    pub fn record_episode(&self, title: &str) {
        if !title.is_empty() {
            self.episode_plays.with_label_values(&[title]).inc();
        }
    }

    /// Observation for `id`; zeroed when the id was never played
    pub fn observation(&self, id: &str) -> TrackObservation {
        let observations = self.observations.lock().unwrap_or_else(|e| e.into_inner());
        observations.get(id).cloned().unwrap_or_else(|| TrackObservation {
            identifier: id.to_string(),
            ..Default::default()
        })
    }

    pub fn play_errors(&self) -> u64 {
        self.play_errors.get()
    }

    pub fn scan_count(&self, outcome: &str) -> u64 {
        self.scan_requests.with_label_values(&[outcome]).get()
    }

    /// Render all metrics in the text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    fn with_observation(&self, id: &str, update: impl FnOnce(&mut TrackObservation)) {
        let mut observations = self.observations.lock().unwrap_or_else(|e| e.into_inner());
        let obs = observations
            .entry(id.to_string())
            .or_insert_with(|| TrackObservation {
                identifier: id.to_string(),
                ..Default::default()
            });
        update(obs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_accumulates() {
        let metrics = PlaybackMetrics::new().unwrap();
        metrics.record_play("A");
        metrics.record_duration("A", 0.5);
        metrics.record_duration("A", 1.25);
        metrics.record_play("A");

        let obs = metrics.observation("A");
        assert_eq!(obs.identifier, "A");
        assert_eq!(obs.play_count, 2);
        assert!((obs.cumulative_seconds_played - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_unplayed_observation_is_zero() {
        let metrics = PlaybackMetrics::new().unwrap();
        let obs = metrics.observation("never");
        assert_eq!(obs.play_count, 0);
        assert_eq!(obs.cumulative_seconds_played, 0.0);
    }

    #[test]
    fn test_non_positive_durations_ignored() {
        let metrics = PlaybackMetrics::new().unwrap();
        metrics.record_duration("A", 0.0);
        metrics.record_duration("A", -3.0);
        assert_eq!(metrics.observation("A").cumulative_seconds_played, 0.0);
    }

    #[test]
    fn test_render_contains_series() {
        let metrics = PlaybackMetrics::new().unwrap();
        metrics.record_play("A");
        metrics.record_duration("A", 2.0);
        metrics.record_scan("cooldown");
        metrics.record_play_error();
        metrics.record_episode("Episode 12");

        let text = metrics.render().unwrap();
        assert!(text.contains("track_plays_total{track_id=\"A\"} 1"));
        assert!(text.contains("track_play_duration_seconds{track_id=\"A\"} 2"));
        assert!(text.contains("scan_requests_total{outcome=\"cooldown\"} 1"));
        assert!(text.contains("scan_requests_total{outcome=\"started\"} 0"));
        assert!(text.contains("play_errors_total 1"));
        assert!(text.contains("episode_plays_total{title=\"Episode 12\"} 1"));
        assert_eq!(metrics.play_errors(), 1);
    }
}
