//! Configuration management for yoda-player
//!
//! Bootstrap settings come from a TOML file located by
//! [`yoda_common::config::ConfigFileResolver`]. Every field has a built-in
//! default, so a missing file starts the service with the reference timings.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --catalog, --backend)
//! 2. Environment variables (YODA_PORT, YODA_CATALOG, YODA_BACKEND)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use yoda_common::config::LoggingConfig;
use yoda_common::time::millis_to_duration;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Path to the JSON track catalog
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Default: 3001 (the port RFID readers post to)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Session arbitration timings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long a session may run without a renewing scan
    #[serde(default = "default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,

    /// Minimum gap after a stop before a new start is accepted
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Tag id that stops playback instead of starting it
    ///
    /// Trimmed on load, the same way scanned ids are.
    #[serde(default, deserialize_with = "trimmed")]
    pub stop_tag: Option<String>,
}

impl SessionConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        millis_to_duration(self.inactivity_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        millis_to_duration(self.cooldown_ms)
    }
}

/// Which player backend drives audio output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Persistent connection to a music player daemon
    #[default]
    Mpd,
    /// One external decoder process per start
    Process,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpd" => Ok(BackendKind::Mpd),
            "process" => Ok(BackendKind::Process),
            other => Err(format!("unknown backend '{}' (expected mpd or process)", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mpd => f.write_str("mpd"),
            BackendKind::Process => f.write_str("process"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default)]
    pub mpd: MpdConfig,

    #[serde(default)]
    pub process: ProcessConfig,
}

/// Music player daemon connection
#[derive(Debug, Clone, Deserialize)]
pub struct MpdConfig {
    /// host:port of the daemon
    #[serde(default = "default_mpd_address")]
    pub address: String,

    /// Empty means no password command is sent
    #[serde(default)]
    pub password: String,

    /// Upper bound for connect and for each command exchange
    #[serde(default = "default_mpd_timeout_ms")]
    pub timeout_ms: u64,
}

impl MpdConfig {
    pub fn timeout(&self) -> Duration {
        millis_to_duration(self.timeout_ms)
    }
}

/// External decoder process
///
/// Arguments may contain `{path}`, `{offset}` (seconds) and `{offset_frames}`
/// (MPEG frames at 44.1 kHz), substituted on every start.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_process_args")]
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            catalog_path: default_catalog_path(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
            cooldown_ms: default_cooldown_ms(),
            stop_tag: None,
        }
    }
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            address: default_mpd_address(),
            password: String::new(),
            timeout_ms: default_mpd_timeout_ms(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_process_args(),
        }
    }
}

fn trimmed<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|s| s.trim().to_string()))
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_inactivity_timeout_ms() -> u64 {
    3500
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("mp3.json")
}

fn default_mpd_address() -> String {
    "localhost:6600".to_string()
}

fn default_mpd_timeout_ms() -> u64 {
    2000
}

fn default_program() -> String {
    "mpg123".to_string()
}

fn default_process_args() -> Vec<String> {
    ["-q", "-k", "{offset_frames}", "{path}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Command-line/environment values that win over the TOML file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub catalog_path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
}

impl PlayerConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(path) = overrides.catalog_path {
            self.catalog_path = path;
        }
        if let Some(kind) = overrides.backend {
            self.backend.kind = kind;
        }
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.inactivity_timeout_ms == 0 {
            return Err(Error::Config(
                "session.inactivity_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.session.cooldown_ms == 0 {
            return Err(Error::Config(
                "session.cooldown_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(tag) = &self.session.stop_tag {
            if tag.trim().is_empty() {
                return Err(Error::Config("session.stop_tag must not be blank".to_string()));
            }
        }
        if self.backend.kind == BackendKind::Process {
            if self.backend.process.program.trim().is_empty() {
                return Err(Error::Config("backend.process.program is empty".to_string()));
            }
            if !self.backend.process.args.iter().any(|a| a.contains("{path}")) {
                return Err(Error::Config(
                    "backend.process.args must reference {path}".to_string(),
                ));
            }
        }
        if self.backend.kind == BackendKind::Mpd && self.backend.mpd.timeout_ms == 0 {
            return Err(Error::Config(
                "backend.mpd.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timings() {
        let config = PlayerConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.session.inactivity_timeout(), Duration::from_millis(3500));
        assert_eq!(config.session.cooldown(), Duration::from_secs(5));
        assert_eq!(config.catalog_path, PathBuf::from("mp3.json"));
        assert_eq!(config.backend.kind, BackendKind::Mpd);
        assert_eq!(config.backend.mpd.address, "localhost:6600");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_document_parses() {
        let text = r#"
            catalog_path = "/srv/yoda/tracks.json"

            [server]
            host = "127.0.0.1"
            port = 8080

            [session]
            inactivity_timeout_ms = 1000
            cooldown_ms = 2000
            stop_tag = "0xDEAD"

            [backend]
            kind = "process"

            [backend.process]
            program = "mpg321"
            args = ["-k", "{offset_frames}", "{path}"]
        "#;
        let config = PlayerConfig::from_toml_str(text).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.session.stop_tag.as_deref(), Some("0xDEAD"));
        assert_eq!(config.backend.kind, BackendKind::Process);
        assert_eq!(config.backend.process.program, "mpg321");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stop_tag_is_trimmed() {
        let config = PlayerConfig::from_toml_str("[session]\nstop_tag = \" STOP \"\n").unwrap();
        assert_eq!(config.session.stop_tag.as_deref(), Some("STOP"));
        assert!(config.validate().is_ok());

        let blank = PlayerConfig::from_toml_str("[session]\nstop_tag = \"   \"\n").unwrap();
        assert_eq!(blank.session.stop_tag.as_deref(), Some(""));
        assert!(matches!(blank.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_delays_rejected() {
        let mut config = PlayerConfig::default();
        assert_eq!(config.catalog_path, PathBuf::from("mp3.json"));
        config.session.cooldown_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.session.cooldown_ms = 10;
        config.session.inactivity_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_process_args_must_reference_path() {
        let mut config = PlayerConfig::from_toml_str("").unwrap();
        config.backend.kind = BackendKind::Process;
        config.backend.process.args = vec!["-q".to_string()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = PlayerConfig::from_toml_str("[server]\nport = 9000\n").unwrap();
        config.apply_overrides(Overrides {
            port: Some(3100),
            catalog_path: Some(PathBuf::from("other.json")),
            backend: Some(BackendKind::Process),
        });
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.catalog_path, PathBuf::from("other.json"));
        assert_eq!(config.backend.kind, BackendKind::Process);
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("MPD".parse::<BackendKind>().unwrap(), BackendKind::Mpd);
        assert_eq!("process".parse::<BackendKind>().unwrap(), BackendKind::Process);
        assert!("vlc".parse::<BackendKind>().is_err());
    }
}
