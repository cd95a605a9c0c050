//! Media engine capability consumed by the player.
//!
//! The player never decodes audio itself. It drives a [`Pipeline`] (a
//! playbin-like engine) by URI and target state, and reacts to the
//! [`BusMessage`]s the engine posts while it works.

use std::fmt;

use crate::error::Result;

/// Engine element states, lowest first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineState {
    /// No pending state.
    #[default]
    VoidPending,
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VoidPending => write!(f, "VOID_PENDING"),
            Self::Null => write!(f, "NULL"),
            Self::Ready => write!(f, "READY"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Playing => write!(f, "PLAYING"),
        }
    }
}

/// Status messages posted by the engine, delivered in posting order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusMessage {
    /// Buffer fill level, 0-100.
    Buffering(u8),

    /// The current URI played to its end.
    Eos,

    /// The current URI failed.
    Error { error: String, debug: Option<String> },

    StateChanged {
        old: EngineState,
        new: EngineState,
        pending: EngineState,
    },

    /// Tags found in the stream, in order. A `None` value means the tag is
    /// present but its value is not available as text.
    Tag(Vec<(String, Option<String>)>),
}

/// A playbin-like media engine.
pub trait Pipeline {
    /// Sets the URI to play from the next transition to `Playing`.
    fn set_uri(&mut self, uri: &str) -> Result<()>;

    fn set_state(&mut self, state: EngineState) -> Result<()>;

    /// Output volume as a fraction from 0.0 to 1.0.
    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64);
}
