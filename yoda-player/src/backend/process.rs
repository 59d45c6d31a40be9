//! External decoder process backend
//!
//! Each start spawns the configured program (mpg123 by default) with the file
//! and offset substituted into its arguments. Stop kills and reaps it.

use super::{BackendError, PlayerBackend, PlayerStatus};
use crate::config::ProcessConfig;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info};

/// MPEG-1 Layer III frames per second at 44.1 kHz (1152 samples per frame)
const FRAMES_PER_SECOND: f64 = 44_100.0 / 1152.0;

pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    running: Option<RunningPlayer>,
}

struct RunningPlayer {
    child: Child,
    spawned_at: Instant,
    offset_seconds: f64,
}

impl ProcessBackend {
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            running: None,
        }
    }
}

/// Substitute `{path}`, `{offset}` and `{offset_frames}` into `args`
pub fn render_args(args: &[String], path: &str, offset_seconds: f64) -> Vec<String> {
    let frames = offset_frames(offset_seconds).to_string();
    let seconds = format!("{}", offset_seconds);
    args.iter()
        .map(|arg| {
            arg.replace("{path}", path)
                .replace("{offset_frames}", &frames)
                .replace("{offset}", &seconds)
        })
        .collect()
}

/// Frame index for a start offset in seconds
pub fn offset_frames(offset_seconds: f64) -> u64 {
    if !offset_seconds.is_finite() || offset_seconds <= 0.0 {
        return 0;
    }
    (offset_seconds * FRAMES_PER_SECOND).round() as u64
}

#[async_trait]
impl PlayerBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn start(&mut self, path: &str, offset_seconds: f64) -> Result<(), BackendError> {
        // One decoder at a time
        self.stop().await?;

        let args = render_args(&self.args, path, offset_seconds);
        debug!("Spawning {} {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Spawn(format!("{}: {}", self.program, e)))?;

        info!("Started {} (pid {:?}) for {}", self.program, child.id(), path);
        self.running = Some(RunningPlayer {
            child,
            spawned_at: Instant::now(),
            offset_seconds,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        let Some(mut player) = self.running.take() else {
            return Ok(());
        };

        if player.child.try_wait()?.is_none() {
            // kill() also waits, so no zombie is left behind
            player.child.kill().await?;
            debug!("Killed {}", self.program);
        }
        Ok(())
    }

    async fn status(&mut self) -> Result<PlayerStatus, BackendError> {
        let Some(player) = self.running.as_mut() else {
            return Ok(PlayerStatus::default());
        };

        if player.child.try_wait()?.is_some() {
            return Ok(PlayerStatus {
                elapsed: None,
                is_playing: false,
            });
        }

        Ok(PlayerStatus {
            elapsed: Some(player.offset_seconds + player.spawned_at.elapsed().as_secs_f64()),
            is_playing: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let rendered = render_args(
            &args(&["-q", "-k", "{offset_frames}", "--at={offset}", "{path}"]),
            "/music/a.mp3",
            10.0,
        );
        assert_eq!(rendered, args(&["-q", "-k", "383", "--at=10", "/music/a.mp3"]));
    }

    #[test]
    fn test_offset_frames() {
        assert_eq!(offset_frames(0.0), 0);
        assert_eq!(offset_frames(-5.0), 0);
        assert_eq!(offset_frames(1.0), 38);
        assert_eq!(offset_frames(60.0), 2297);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_spawn_error() {
        let mut backend = ProcessBackend::new(&ProcessConfig {
            program: "/nonexistent/yoda-decoder".to_string(),
            args: args(&["{path}"]),
        });

        let err = backend.start("a.mp3", 0.0).await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn(_)));
        assert!(!backend.status().await.unwrap().is_playing);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_status_stop_lifecycle() {
        // `sleep <path>` stands in for a decoder that runs until killed
        let mut backend = ProcessBackend::new(&ProcessConfig {
            program: "sleep".to_string(),
            args: args(&["{path}"]),
        });

        backend.start("30", 5.0).await.unwrap();
        let status = backend.status().await.unwrap();
        assert!(status.is_playing);
        assert!(status.elapsed.unwrap() >= 5.0);

        backend.stop().await.unwrap();
        assert!(!backend.status().await.unwrap().is_playing);

        // Stopping twice is harmless
        backend.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_reports_not_playing() {
        let mut backend = ProcessBackend::new(&ProcessConfig {
            program: "true".to_string(),
            args: args(&["{path}"]),
        });

        backend.start("ignored", 0.0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let status = backend.status().await.unwrap();
        assert!(!status.is_playing);
        assert!(status.elapsed.is_none());
    }
}
