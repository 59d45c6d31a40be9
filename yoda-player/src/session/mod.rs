//! Playback session arbitration
//!
//! - [`state`]: the session record and its accounting
//! - [`timer`]: generation-tagged one-shot timers
//! - [`controller`]: the event loop that owns both

pub mod controller;
pub mod state;
pub mod timer;

pub use controller::{ScanOutcome, SessionController, SessionSettings, SessionSnapshot};
pub use state::{ActivePlay, PlayState, Session};
pub use timer::{TimerKind, TimerSlot};
