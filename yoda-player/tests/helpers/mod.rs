//! Test helpers for yoda-player integration tests
//!
//! - RecordingBackend: PlayerBackend that logs every call in order
//! - Harness: controller + worker + metrics + event bus wired like main.rs

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use yoda_common::{EventBus, YodaEvent};
use yoda_player::api::AppContext;
use yoda_player::backend::{
    spawn_worker, BackendError, BackendHandle, NowPlaying, PlayerBackend, PlayerStatus,
};
use yoda_player::catalog::{Catalog, TrackEntry};
use yoda_player::metrics::PlaybackMetrics;
use yoda_player::session::{SessionController, SessionSettings};

/// One call observed by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Start { path: String, offset: f64 },
    Stop,
}

impl BackendCall {
    pub fn start(path: &str, offset: f64) -> Self {
        BackendCall::Start {
            path: path.to_string(),
            offset,
        }
    }
}

/// Backend double that records calls and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    fail_start: Arc<AtomicBool>,
    title: Arc<Mutex<Option<String>>>,
}

impl RecordingBackend {
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Start { .. }))
            .count()
    }

    pub fn stops(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Stop))
            .count()
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Title reported by now_playing after each start
    pub fn set_title(&self, title: &str) {
        *self.title.lock().unwrap() = Some(title.to_string());
    }
}

#[async_trait]
impl PlayerBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn start(&mut self, path: &str, offset_seconds: f64) -> Result<(), BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::start(path, offset_seconds));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BackendError::Spawn("decoder missing".to_string()));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(BackendCall::Stop);
        Ok(())
    }

    async fn status(&mut self) -> Result<PlayerStatus, BackendError> {
        let calls = self.calls.lock().unwrap();
        let is_playing = matches!(calls.last(), Some(BackendCall::Start { .. }));
        Ok(PlayerStatus {
            elapsed: is_playing.then_some(0.0),
            is_playing,
        })
    }

    async fn now_playing(&mut self) -> Result<Option<NowPlaying>, BackendError> {
        Ok(self.title.lock().unwrap().clone().map(|title| NowPlaying {
            title: Some(title),
            ..Default::default()
        }))
    }
}

/// Catalog from (id, file, offset) triples
pub fn catalog(entries: &[(&str, &str, f64)]) -> Catalog {
    entries
        .iter()
        .map(|(id, file, offset)| {
            (
                id.to_string(),
                TrackEntry {
                    file: file.to_string(),
                    offset_seconds: *offset,
                },
            )
        })
        .collect()
}

/// The catalog used by the scenario tests
pub fn ab_catalog() -> Catalog {
    catalog(&[("A", "a.mp3", 0.0), ("B", "b.mp3", 30.0)])
}

pub fn settings(inactivity_ms: u64, cooldown_ms: u64) -> SessionSettings {
    SessionSettings {
        inactivity_timeout: Duration::from_millis(inactivity_ms),
        cooldown: Duration::from_millis(cooldown_ms),
        stop_tag: None,
    }
}

/// Fully wired controller around a RecordingBackend
pub struct Harness {
    pub controller: SessionController,
    pub backend: RecordingBackend,
    pub handle: BackendHandle,
    pub metrics: Arc<PlaybackMetrics>,
    pub events: EventBus,
    pub event_rx: broadcast::Receiver<YodaEvent>,
    pub shutdown: CancellationToken,
}

impl Harness {
    pub fn new(catalog: Catalog, settings: SessionSettings) -> Self {
        let backend = RecordingBackend::default();
        let (handle, reports, _worker) = spawn_worker(Box::new(backend.clone()));
        let metrics = Arc::new(PlaybackMetrics::new().unwrap());
        let events = EventBus::new(64);
        let event_rx = events.subscribe();

        let (controller, _task) = SessionController::spawn(
            Arc::new(catalog),
            handle.clone(),
            reports,
            Arc::clone(&metrics),
            events.clone(),
            settings,
        );

        Self {
            controller,
            backend,
            handle,
            metrics,
            events,
            event_rx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wait until the worker has executed everything queued so far
    pub async fn settle(&self) {
        self.handle.flush().await;
        // Let the controller consume the resulting reports
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    /// Drain events received so far, returning their type names
    pub fn event_types(&mut self) -> Vec<&'static str> {
        let mut types = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            types.push(event.event_type());
        }
        types
    }

    pub fn app_context(&self) -> AppContext {
        AppContext {
            controller: self.controller.clone(),
            backend: self.handle.clone(),
            metrics: Arc::clone(&self.metrics),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}
