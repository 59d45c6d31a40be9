//! Bootstrap config loading for the player service
//!
//! Exercises the path main.rs takes: resolve, load TOML, apply CLI/env
//! overrides, validate, then load the catalog the config points at.

use std::fs;
use yoda_common::config::{load_toml, ConfigSource};
use yoda_player::catalog::Catalog;
use yoda_player::config::{BackendKind, Overrides, PlayerConfig};
use yoda_player::session::SessionSettings;
use yoda_player::Error;

#[test]
fn test_file_config_drives_session_and_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("tracks.json");
    fs::write(
        &catalog_path,
        r#"{"04A1": {"file": "ep1.mp3", "offset": 90}, "broken": {"file": "x.mp3"}}"#,
    )
    .unwrap();

    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "catalog_path = {:?}\n[session]\ninactivity_timeout_ms = 1500\nstop_tag = \"FF00\"\n",
            catalog_path.display().to_string()
        ),
    )
    .unwrap();

    let config: PlayerConfig = load_toml(&ConfigSource::CommandLine(config_path)).unwrap();
    config.validate().unwrap();

    let settings = SessionSettings::from(&config.session);
    assert_eq!(settings.inactivity_timeout.as_millis(), 1500);
    assert_eq!(settings.cooldown.as_millis(), 5000);
    assert_eq!(settings.stop_tag.as_deref(), Some("FF00"));

    let catalog = Catalog::load(&config.catalog_path).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.lookup("04A1").unwrap().offset_seconds, 90.0);
    assert_eq!(catalog.malformed(), &["broken"]);
}

#[test]
fn test_defaults_when_no_file() {
    let config: PlayerConfig = load_toml(&ConfigSource::Defaults).unwrap();
    assert_eq!(config.bind_addr(), "0.0.0.0:3001");
    assert_eq!(config.catalog_path.to_str(), Some("mp3.json"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_cli_override_then_validation() {
    let mut config: PlayerConfig = load_toml(&ConfigSource::Defaults).unwrap();
    config.backend.process.args = vec!["-q".to_string()];

    // Fine while the daemon backend is selected...
    assert!(config.validate().is_ok());

    // ...but the process backend needs {path}
    config.apply_overrides(Overrides {
        backend: Some(BackendKind::Process),
        ..Default::default()
    });
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn test_unknown_backend_kind_is_config_error() {
    let result = PlayerConfig::from_toml_str("[backend]\nkind = \"vlc\"\n");
    assert!(matches!(result, Err(Error::Config(_))));
}
