//! Events emitted by the player.
//!
//! Observers (menus, notifications, panel icons) register handlers for a
//! signal name and are called synchronously, in registration order, from
//! the player's event loop:
//!
//! | Signal | Event |
//! |--------|-------|
//! | `state_changed` | [`Event::StateChanged`] |
//! | `buffering` | [`Event::Buffering`] |
//! | `eos` | [`Event::Eos`] |
//! | `error` | [`Event::Error`] |
//! | `tags` | [`Event::Tags`] |
//! | `tags::<name>` | [`Event::Tag`] for tag `<name>` |
//! | `volume` | [`Event::Volume`] |
//!
//! # Example
//!
//! ```rust
//! use streamtune::events::{Emitter, Event};
//!
//! let mut emitter = Emitter::default();
//! let id = emitter.connect("tags::title", |event| {
//!     if let Event::Tag { value: Some(title), .. } = event {
//!         println!("Now playing: {title}");
//!     }
//! });
//! emitter.disconnect(id);
//! ```

use std::{borrow::Cow, collections::BTreeMap};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::player::PlaybackState;

/// Last known value of every tag, by tag name.
pub type Tags = BTreeMap<String, String>;

/// Events that can be emitted by the player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The playback state changed.
    StateChanged {
        from: PlaybackState,
        state: PlaybackState,
        label: &'static str,
    },

    /// The engine is filling its buffer.
    Buffering { percent: u8 },

    /// The last URI of the playlist played to its end.
    Eos,

    /// The last URI of the playlist failed; playback stopped.
    Error {
        error: String,
        debug: Option<String>,
    },

    /// All known tags, after an update.
    Tags { tags: Tags },

    /// A single tag was updated. `None` means the tag was removed.
    Tag { name: String, value: Option<String> },

    /// The volume percentage changed.
    Volume { value: u8 },
}

impl Event {
    pub const STATE_CHANGED: &'static str = "state_changed";
    pub const BUFFERING: &'static str = "buffering";
    pub const EOS: &'static str = "eos";
    pub const ERROR: &'static str = "error";
    pub const TAGS: &'static str = "tags";
    pub const VOLUME: &'static str = "volume";

    /// Separates a detailed signal from its detail, as in `tags::title`.
    pub const DETAIL_SEPARATOR: &'static str = "::";

    /// Name of the signal this event is emitted on.
    #[must_use]
    pub fn signal(&self) -> Cow<'static, str> {
        match self {
            Self::StateChanged { .. } => Cow::Borrowed(Self::STATE_CHANGED),
            Self::Buffering { .. } => Cow::Borrowed(Self::BUFFERING),
            Self::Eos => Cow::Borrowed(Self::EOS),
            Self::Error { .. } => Cow::Borrowed(Self::ERROR),
            Self::Tags { .. } => Cow::Borrowed(Self::TAGS),
            Self::Tag { name, .. } => {
                Cow::Owned(format!("{}{}{name}", Self::TAGS, Self::DETAIL_SEPARATOR))
            }
            Self::Volume { .. } => Cow::Borrowed(Self::VOLUME),
        }
    }
}

/// Identifies a connected handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

type Handler = Box<dyn FnMut(&Event) + Send>;

enum Filter {
    Signal(String),
    All,
}

impl Filter {
    fn accepts(&self, signal: &str) -> bool {
        match self {
            Self::Signal(name) => name == signal,
            Self::All => true,
        }
    }
}

/// Registry of event handlers with synchronous dispatch.
#[derive(Default)]
pub struct Emitter {
    handlers: Vec<(HandlerId, Filter, Handler)>,
    next_id: u64,
}

impl Emitter {
    /// Calls `handler` for every event emitted on `signal`.
    ///
    /// Signal names match exactly: a handler on `tags` does not see
    /// `tags::title` events.
    pub fn connect<S, F>(&mut self, signal: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&Event) + Send + 'static,
    {
        self.insert(Filter::Signal(signal.into()), Box::new(handler))
    }

    /// Calls `handler` for every event.
    pub fn connect_all<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.insert(Filter::All, Box::new(handler))
    }

    /// Returns a channel that receives a copy of every event.
    ///
    /// The forwarding handler stays connected; events sent after the
    /// receiver is dropped are discarded.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connect_all(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Removes a handler. Returns `false` if it was not connected.
    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        let len = self.handlers.len();
        self.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        self.handlers.len() != len
    }

    pub fn emit(&mut self, event: &Event) {
        let signal = event.signal();
        trace!("emitting {signal}: {event:?}");
        for (_, filter, handler) in &mut self.handlers {
            if filter.accepts(&signal) {
                handler(event);
            }
        }
    }

    fn insert(&mut self, filter: Filter, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, filter, handler));
        id
    }
}
