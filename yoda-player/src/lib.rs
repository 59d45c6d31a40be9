//! yoda-player library
//!
//! RFID/NFC-triggered playback controller: a scanned tag id is resolved through
//! the [`catalog::Catalog`], arbitrated by the [`session::SessionController`] and
//! turned into start/stop commands for a [`backend::PlayerBackend`].

pub mod api;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod session;

pub use error::{Error, Result};
