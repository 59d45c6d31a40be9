//! # Yoda Common Library
//!
//! Shared code for the yoda tag-triggered player:
//! - Error type and Result alias
//! - Bootstrap configuration file resolution and TOML loading
//! - Session event types (YodaEvent) and the EventBus
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, YodaEvent};
