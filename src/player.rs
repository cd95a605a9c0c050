//! Playback controller.
//!
//! The [`Player`] turns a station URL into sound:
//! 1. `start(url)` moves to [`PlaybackState::GettingMetadata`] and resolves
//!    the URL into a playlist on a background task.
//! 2. The playlist head is handed to the [`Pipeline`]; from then on engine
//!    [`BusMessage`]s drive the state.
//! 3. When a URI ends or fails, the next one is tried. Only when the
//!    playlist is exhausted is `eos` or `error` emitted.
//!
//! All state changes happen on one event loop, [`Player::run`], which
//! serializes UI [`Command`]s, resolver completions and bus messages in
//! arrival order.
//!
//! # Example
//!
//! ```rust
//! use streamtune::{config::Config, http::Client, player::{Command, Player}, resolver::Resolver};
//!
//! let config = Config::new();
//! let resolver = Resolver::new(Client::new(&config)?);
//! let mut player = Player::new(engine, resolver, &config);
//! player.connect("state_changed", |event| println!("{event:?}"));
//!
//! let (commands, rx) = tokio::sync::mpsc::unbounded_channel();
//! commands.send(Command::Start("http://example.com/station.pls".into()))?;
//! player.run(rx, bus).await;
//! ```

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    config::Config,
    events::{Emitter, Event, HandlerId, Tags},
    pipeline::{BusMessage, EngineState, Pipeline},
    resolver::{Playlist, Resolved, Resolver},
    transport::Transport,
};

/// Playback states, ordered: anything above [`Stopped`](Self::Stopped) is
/// active.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackState {
    /// Engine state without a counterpart.
    #[default]
    Default,
    Stopped,
    /// Fetching and sniffing the station URL.
    GettingMetadata,
    Buffering,
    Playing,
}

impl PlaybackState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Stopped => "STOPPED",
            Self::GettingMetadata => "GETTING_METADATA",
            Self::Buffering => "BUFFERING",
            Self::Playing => "PLAYING",
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self > Self::Stopped
    }
}

impl From<EngineState> for PlaybackState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Null => Self::Stopped,
            EngineState::Ready | EngineState::Paused => Self::Buffering,
            EngineState::Playing => Self::Playing,
            EngineState::VoidPending => Self::Default,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Requests from the UI, processed by [`Player::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Stop,
    SetVolume(u8),
    /// Stop playback and leave the event loop.
    Shutdown,
}

pub struct Player<T: Transport, P: Pipeline> {
    pipeline: P,
    resolver: Resolver<T>,
    emitter: Emitter,

    state: PlaybackState,
    playlist: Playlist,
    tags: Tags,
    url: Option<String>,

    /// Read-back volume percentage after the last change.
    volume: u8,

    /// Bumped on every `start()` and `stop()`; resolutions tagged with an
    /// older generation are stale.
    generation: u64,
    resolved_tx: mpsc::UnboundedSender<Resolved>,
    resolved_rx: mpsc::UnboundedReceiver<Resolved>,
}

impl<T: Transport, P: Pipeline> Player<T, P> {
    /// Creates a stopped player and applies the configured initial volume.
    pub fn new(mut pipeline: P, resolver: Resolver<T>, config: &Config) -> Self {
        pipeline.set_volume(f64::from(config.initial_volume) / 100.0);
        let volume = percentage(pipeline.volume());
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();

        Self {
            pipeline,
            resolver,
            emitter: Emitter::default(),
            state: PlaybackState::Stopped,
            playlist: Playlist::new(),
            tags: Tags::new(),
            url: None,
            volume,
            generation: 0,
            resolved_tx,
            resolved_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// URL passed to the last `start()`.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    #[must_use]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// See [`Emitter::connect`].
    pub fn connect<S, F>(&mut self, signal: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&Event) + Send + 'static,
    {
        self.emitter.connect(signal, handler)
    }

    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        self.emitter.disconnect(id)
    }

    /// See [`Emitter::subscribe`].
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        self.emitter.subscribe()
    }

    /// Starts resolving and playing `url`.
    ///
    /// Does nothing while the player is active.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime, as the resolution
    /// runs on a spawned task.
    pub fn start(&mut self, url: &str) {
        if self.state.is_active() {
            debug!("ignoring start of {url} while {}", self.state);
            return;
        }

        info!("starting {url}");
        self.url = Some(url.to_owned());
        self.generation = self.generation.wrapping_add(1);

        let from = self.state;
        self.state = PlaybackState::GettingMetadata;
        self.emit_state_changed(from);

        self.resolver
            .spawn(url, self.generation, self.resolved_tx.clone());
    }

    /// Stops playback and clears the playlist.
    ///
    /// Does nothing unless the player is active.
    pub fn stop(&mut self) {
        if !self.state.is_active() {
            return;
        }

        info!("stopping");
        self.generation = self.generation.wrapping_add(1);
        self.resolver.cancel();

        let from = self.state;
        self.state = PlaybackState::Stopped;
        self.playlist.clear();
        self.set_engine_state(EngineState::Null);

        self.emit_state_changed(from);
    }

    /// Volume percentage as read back from the pipeline.
    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Sets the volume percentage, clamped to 100.
    ///
    /// Emits `volume` only if the percentage read back from the pipeline
    /// differs from before, so repeated identical sets are silent.
    pub fn set_volume(&mut self, volume: u8) {
        if volume > Config::MAX_VOLUME {
            warn!("clamping volume {volume} to {}", Config::MAX_VOLUME);
        }
        let volume = volume.min(Config::MAX_VOLUME);

        let old_volume = self.volume;
        self.pipeline.set_volume(f64::from(volume) / 100.0);
        self.volume = percentage(self.pipeline.volume());

        if self.volume != old_volume {
            debug!("volume {old_volume} -> {}", self.volume);
            self.emit(Event::Volume { value: self.volume });
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(url) => self.start(&url),
            Command::Stop | Command::Shutdown => self.stop(),
            Command::SetVolume(volume) => self.set_volume(volume),
        }
    }

    /// Installs the playlist of a finished resolution and starts its head.
    ///
    /// Completions from before the latest `start()` or `stop()` are ignored.
    pub fn handle_resolved(&mut self, resolved: Resolved) {
        if resolved.generation != self.generation || !self.state.is_active() {
            trace!(
                "ignoring stale resolution of {} (generation {}, now {})",
                resolved.url,
                resolved.generation,
                self.generation
            );
            return;
        }

        debug!("{} resolved to {:?}", resolved.url, resolved.playlist);
        self.playlist = resolved.playlist;
        self.play_head();
    }

    /// Reacts to a status message from the pipeline.
    pub fn handle_message(&mut self, message: BusMessage) {
        trace!("bus message: {message:?}");
        match message {
            BusMessage::Buffering(percent) => self.handle_buffering(percent),
            BusMessage::Eos => self.handle_eos(),
            BusMessage::Error { error, debug } => self.handle_error(error, debug),
            BusMessage::StateChanged { new, .. } => self.transition(new.into()),
            BusMessage::Tag(tags) => self.handle_tags(tags),
        }
    }

    /// Runs the event loop until [`Command::Shutdown`] or until either
    /// channel closes. Playback is stopped on the way out.
    pub async fn run(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut bus: mpsc::UnboundedReceiver<BusMessage>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                Some(resolved) = self.resolved_rx.recv() => self.handle_resolved(resolved),

                message = bus.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        warn!("pipeline bus closed");
                        break;
                    }
                },
            }
        }

        self.stop();
    }

    fn handle_buffering(&mut self, percent: u8) {
        self.transition(PlaybackState::Buffering);
        self.emit(Event::Buffering { percent });

        if percent < 100 {
            return;
        }

        // A full buffer always announces the buffering to playing edge.
        self.state = PlaybackState::Playing;
        self.emit_state_changed(PlaybackState::Buffering);
    }

    fn handle_eos(&mut self) {
        if self.advance() {
            return;
        }

        info!("end of stream");
        self.emit(Event::Eos);
    }

    fn handle_error(&mut self, error: String, debug: Option<String>) {
        warn!("playback failed: {error}");
        if self.advance() {
            return;
        }

        error!("no more uris to try after: {error}");
        self.emit(Event::Error { error, debug });
        self.transition(PlaybackState::Stopped);
    }

    fn handle_tags(&mut self, tags: Vec<(String, Option<String>)>) {
        for (name, value) in tags {
            match &value {
                Some(value) => {
                    self.tags.insert(name.clone(), value.clone());
                }
                None => {
                    self.tags.remove(&name);
                }
            }
            self.emit(Event::Tag { name, value });
        }

        self.emit(Event::Tags {
            tags: self.tags.clone(),
        });
    }

    /// Stops the current URI and plays the next one, if any. Returns
    /// whether there was a next one.
    fn advance(&mut self) -> bool {
        self.set_engine_state(EngineState::Null);
        self.playlist.pop_front();

        if self.playlist.is_empty() {
            return false;
        }

        self.play_head();
        true
    }

    /// Hands the playlist head to the pipeline. A URI the pipeline rejects
    /// is treated like a playback error on it.
    fn play_head(&mut self) {
        let Some(uri) = self.playlist.front().cloned() else {
            return;
        };

        debug!("playing {uri}");
        let started = self
            .pipeline
            .set_uri(&uri)
            .and_then(|()| self.pipeline.set_state(EngineState::Playing));

        if let Err(e) = started {
            self.handle_error(format!("failed to play {uri}: {e}"), None);
        }
    }

    fn set_engine_state(&mut self, state: EngineState) {
        if let Err(e) = self.pipeline.set_state(state) {
            error!("failed to set pipeline to {state}: {e}");
        }
    }

    fn transition(&mut self, state: PlaybackState) {
        let from = self.state;
        self.state = state;
        if from != state {
            self.emit_state_changed(from);
        }
    }

    fn emit_state_changed(&mut self, from: PlaybackState) {
        debug!("state {from} -> {}", self.state);
        self.emit(Event::StateChanged {
            from,
            state: self.state,
            label: self.state.label(),
        });
    }

    fn emit(&mut self, event: Event) {
        self.emitter.emit(&event);
    }
}

impl<T: Transport, P: Pipeline> Drop for Player<T, P> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Converts a pipeline volume fraction to a whole percentage.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentage(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        future::Future,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        error::{Error, Result},
        transport::{Headers, Response},
    };

    // --- fakes ---

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        SetUri(String),
        SetState(EngineState),
    }

    /// Records calls and stores volume with limited precision, as a real
    /// mixer might.
    #[derive(Default)]
    struct Engine {
        calls: Vec<Call>,
        volume: f64,
        /// URIs `set_uri` refuses.
        rejected: Vec<&'static str>,
    }

    impl Pipeline for Engine {
        fn set_uri(&mut self, uri: &str) -> Result<()> {
            self.calls.push(Call::SetUri(uri.to_owned()));
            if self.rejected.contains(&uri) {
                return Err(Error::invalid_argument(format!("no handler for {uri}")));
            }
            Ok(())
        }

        fn set_state(&mut self, state: EngineState) -> Result<()> {
            self.calls.push(Call::SetState(state));
            Ok(())
        }

        fn volume(&self) -> f64 {
            self.volume
        }

        fn set_volume(&mut self, volume: f64) {
            self.volume = (volume * 1000.0).round() / 1000.0;
        }
    }

    #[derive(Clone)]
    struct Page {
        content_type: &'static str,
        body: Option<&'static str>,
    }

    impl Response for Page {
        fn status(&self) -> u16 {
            200
        }

        fn headers(&self) -> Headers {
            [("Content-Type", self.content_type)].into_iter().collect()
        }

        fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send {
            let chunk = self.body.take().map(|body| body.as_bytes().to_vec());
            async move { Ok(chunk) }
        }
    }

    #[derive(Default)]
    struct Pages(HashMap<&'static str, Page>);

    impl Transport for Pages {
        type Response = Page;

        fn get(&self, url: &str) -> impl Future<Output = Result<Page>> + Send {
            let page = self.0.get(url).cloned();
            async move { page.ok_or_else(|| Error::unavailable("could not connect")) }
        }
    }

    const STATION: &str = "http://radio.example/station.pls";
    const DIRECT: &str = "http://radio.example/live.mp3";

    fn pages() -> Pages {
        Pages(HashMap::from([(
            STATION,
            Page {
                content_type: "audio/x-scpls",
                body: Some("[playlist]\nFile1=http://a\nFile2=http://b\n"),
            },
        )]))
    }

    fn player() -> (Player<Pages, Engine>, Arc<Mutex<Vec<Event>>>) {
        player_with(Engine::default())
    }

    fn player_with(engine: Engine) -> (Player<Pages, Engine>, Arc<Mutex<Vec<Event>>>) {
        let config = Config::new().with_initial_volume(50);
        let mut player = Player::new(engine, Resolver::new(pages()), &config);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        player
            .emitter
            .connect_all(move |event| sink.lock().unwrap().push(event.clone()));
        (player, events)
    }

    fn take(events: &Arc<Mutex<Vec<Event>>>) -> Vec<Event> {
        std::mem::take(&mut *events.lock().unwrap())
    }

    fn changed(from: PlaybackState, state: PlaybackState) -> Event {
        Event::StateChanged {
            from,
            state,
            label: state.label(),
        }
    }

    /// Starts `url` and installs its resolution.
    async fn started(player: &mut Player<Pages, Engine>, url: &str) {
        player.start(url);
        let resolved = player.resolved_rx.recv().await.unwrap();
        player.handle_resolved(resolved);
    }

    fn state_changed(new: EngineState) -> BusMessage {
        BusMessage::StateChanged {
            old: EngineState::Null,
            new,
            pending: EngineState::VoidPending,
        }
    }

    // --- states ---

    #[test]
    fn state_ordering_and_labels() {
        assert!(PlaybackState::Default < PlaybackState::Stopped);
        assert!(PlaybackState::Stopped < PlaybackState::GettingMetadata);
        assert!(PlaybackState::Buffering < PlaybackState::Playing);
        assert!(!PlaybackState::Stopped.is_active());
        assert!(!PlaybackState::Default.is_active());
        assert!(PlaybackState::GettingMetadata.is_active());
        assert_eq!(PlaybackState::GettingMetadata.to_string(), "GETTING_METADATA");
    }

    #[test]
    fn engine_states_map_to_playback_states() {
        assert_eq!(PlaybackState::from(EngineState::Null), PlaybackState::Stopped);
        assert_eq!(PlaybackState::from(EngineState::Ready), PlaybackState::Buffering);
        assert_eq!(PlaybackState::from(EngineState::Paused), PlaybackState::Buffering);
        assert_eq!(PlaybackState::from(EngineState::Playing), PlaybackState::Playing);
        assert_eq!(PlaybackState::from(EngineState::VoidPending), PlaybackState::Default);
    }

    // --- start / stop ---

    #[tokio::test]
    async fn start_resolves_and_plays_head() {
        let (mut player, events) = player();

        player.start(STATION);
        assert_eq!(player.state(), PlaybackState::GettingMetadata);
        assert_eq!(player.url(), Some(STATION));
        assert_eq!(
            take(&events),
            [changed(PlaybackState::Stopped, PlaybackState::GettingMetadata)]
        );

        let resolved = player.resolved_rx.recv().await.unwrap();
        player.handle_resolved(resolved);

        assert_eq!(player.playlist(), &["http://a", "http://b"]);
        assert_eq!(
            player.pipeline.calls,
            [
                Call::SetUri("http://a".to_owned()),
                Call::SetState(EngineState::Playing)
            ]
        );
        // State follows the engine, not the resolution.
        assert_eq!(player.state(), PlaybackState::GettingMetadata);
        assert!(take(&events).is_empty());
    }

    #[tokio::test]
    async fn unrecognized_url_is_played_directly() {
        let (mut player, _) = player();
        started(&mut player, DIRECT).await;
        assert_eq!(player.playlist(), &[DIRECT]);
        assert_eq!(player.pipeline.calls[0], Call::SetUri(DIRECT.to_owned()));
    }

    #[tokio::test]
    async fn start_while_active_is_ignored() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        player.handle_message(state_changed(EngineState::Playing));
        take(&events);
        let calls = player.pipeline.calls.len();

        player.start(DIRECT);

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.url(), Some(STATION));
        assert_eq!(player.playlist(), &["http://a", "http://b"]);
        assert_eq!(player.pipeline.calls.len(), calls);
        assert!(take(&events).is_empty());
    }

    #[tokio::test]
    async fn stop_clears_playlist_and_nulls_engine() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        take(&events);

        player.stop();

        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.playlist().is_empty());
        assert_eq!(
            player.pipeline.calls.last(),
            Some(&Call::SetState(EngineState::Null))
        );
        assert_eq!(
            take(&events),
            [changed(PlaybackState::GettingMetadata, PlaybackState::Stopped)]
        );
    }

    #[test]
    #[should_panic]
    fn start_requires_a_runtime() {
        let (mut player, _) = player();
        player.start(STATION);
    }

    #[test]
    fn stop_while_stopped_is_ignored() {
        let (mut player, events) = player();
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.pipeline.calls.is_empty());
        assert!(take(&events).is_empty());
    }

    #[tokio::test]
    async fn stale_resolution_after_stop_is_ignored() {
        let (mut player, events) = player();
        player.start(STATION);
        let generation = player.generation;
        player.stop();
        take(&events);
        let calls = player.pipeline.calls.clone();

        player.handle_resolved(Resolved {
            generation,
            url: STATION.to_owned(),
            playlist: ["http://a".to_owned()].into(),
        });

        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.playlist().is_empty());
        assert_eq!(player.pipeline.calls, calls);
        assert!(take(&events).is_empty());
    }

    #[tokio::test]
    async fn stale_resolution_after_restart_is_ignored() {
        let (mut player, _) = player();
        player.start(STATION);
        let stale = player.generation;
        player.stop();
        player.start(DIRECT);

        player.handle_resolved(Resolved {
            generation: stale,
            url: STATION.to_owned(),
            playlist: ["http://a".to_owned()].into(),
        });
        assert!(player.playlist().is_empty());

        let resolved = player.resolved_rx.recv().await.unwrap();
        assert_eq!(resolved.url, DIRECT);
        player.handle_resolved(resolved);
        assert_eq!(player.playlist(), &[DIRECT]);
    }

    #[tokio::test]
    async fn restart_cycles() {
        let (mut player, _) = player();
        for _ in 0..3 {
            started(&mut player, STATION).await;
            assert!(player.state().is_active());
            player.stop();
            assert_eq!(player.state(), PlaybackState::Stopped);
        }
    }

    // --- bus messages ---

    #[tokio::test]
    async fn engine_state_changes_are_mirrored_once() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        take(&events);

        player.handle_message(state_changed(EngineState::Ready));
        player.handle_message(state_changed(EngineState::Paused));
        player.handle_message(state_changed(EngineState::Playing));

        assert_eq!(
            take(&events),
            [
                changed(PlaybackState::GettingMetadata, PlaybackState::Buffering),
                changed(PlaybackState::Buffering, PlaybackState::Playing),
            ]
        );
    }

    #[tokio::test]
    async fn buffering_progress() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        take(&events);

        player.handle_message(BusMessage::Buffering(10));
        player.handle_message(BusMessage::Buffering(60));
        player.handle_message(BusMessage::Buffering(100));

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(
            take(&events),
            [
                changed(PlaybackState::GettingMetadata, PlaybackState::Buffering),
                Event::Buffering { percent: 10 },
                Event::Buffering { percent: 60 },
                Event::Buffering { percent: 100 },
                changed(PlaybackState::Buffering, PlaybackState::Playing),
            ]
        );
    }

    #[tokio::test]
    async fn eos_advances_then_ends() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        take(&events);
        player.pipeline.calls.clear();

        player.handle_message(BusMessage::Eos);
        assert_eq!(player.playlist(), &["http://b"]);
        assert_eq!(
            player.pipeline.calls,
            [
                Call::SetState(EngineState::Null),
                Call::SetUri("http://b".to_owned()),
                Call::SetState(EngineState::Playing),
            ]
        );
        assert!(take(&events).is_empty());

        player.handle_message(BusMessage::Eos);
        assert!(player.playlist().is_empty());
        assert_eq!(take(&events), [Event::Eos]);
        assert_eq!(
            player.pipeline.calls.last(),
            Some(&Call::SetState(EngineState::Null))
        );
    }

    #[tokio::test]
    async fn errors_fall_back_silently_until_exhausted() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        player.handle_message(state_changed(EngineState::Playing));
        take(&events);

        player.handle_message(BusMessage::Error {
            error: "not found".to_owned(),
            debug: None,
        });
        assert_eq!(player.playlist(), &["http://b"]);
        assert!(take(&events).is_empty());

        player.handle_message(BusMessage::Error {
            error: "could not decode".to_owned(),
            debug: Some("demuxer".to_owned()),
        });
        assert!(player.playlist().is_empty());
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(
            take(&events),
            [
                Event::Error {
                    error: "could not decode".to_owned(),
                    debug: Some("demuxer".to_owned()),
                },
                changed(PlaybackState::Playing, PlaybackState::Stopped),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_uri_falls_back_to_next() {
        let (mut player, events) = player_with(Engine {
            rejected: vec!["http://a"],
            ..Engine::default()
        });
        started(&mut player, STATION).await;

        assert_eq!(player.playlist(), &["http://b"]);
        assert_eq!(
            player.pipeline.calls,
            [
                Call::SetUri("http://a".to_owned()),
                Call::SetState(EngineState::Null),
                Call::SetUri("http://b".to_owned()),
                Call::SetState(EngineState::Playing),
            ]
        );
        assert_eq!(player.state(), PlaybackState::GettingMetadata);
        assert_eq!(
            take(&events),
            [changed(PlaybackState::Stopped, PlaybackState::GettingMetadata)]
        );
    }

    #[tokio::test]
    async fn rejected_last_uri_reports_error_and_stops() {
        let (mut player, events) = player_with(Engine {
            rejected: vec!["foo://bad"],
            ..Engine::default()
        });
        started(&mut player, "foo://bad").await;

        assert!(player.playlist().is_empty());
        assert_eq!(player.state(), PlaybackState::Stopped);

        let events = take(&events);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[1],
            Event::Error { error, debug: None } if error.contains("foo://bad")
        ));
        assert_eq!(
            events[2],
            changed(PlaybackState::GettingMetadata, PlaybackState::Stopped)
        );

        // The player can be started again afterwards.
        player.start(STATION);
        assert_eq!(player.state(), PlaybackState::GettingMetadata);
    }

    #[tokio::test]
    async fn tags_update_incrementally() {
        let (mut player, events) = player();
        started(&mut player, STATION).await;
        take(&events);

        player.handle_message(BusMessage::Tag(vec![
            ("title".to_owned(), Some("Morning News".to_owned())),
            ("organization".to_owned(), Some("Radio".to_owned())),
        ]));
        player.handle_message(BusMessage::Tag(vec![("organization".to_owned(), None)]));

        let expected = Tags::from([("title".to_owned(), "Morning News".to_owned())]);
        assert_eq!(player.tags(), &expected);

        let events = take(&events);
        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0],
            Event::Tag {
                name: "title".to_owned(),
                value: Some("Morning News".to_owned())
            }
        );
        assert_eq!(
            events[3],
            Event::Tag {
                name: "organization".to_owned(),
                value: None
            }
        );
        assert_eq!(events[4], Event::Tags { tags: expected });
    }

    #[tokio::test]
    async fn tag_handlers_receive_only_their_tag() {
        let (mut player, _) = player();
        let titles = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&titles);
        player.connect("tags::title", move |event| {
            if let Event::Tag { value, .. } = event {
                sink.lock().unwrap().push(value.clone());
            }
        });

        player.handle_message(BusMessage::Tag(vec![
            ("artist".to_owned(), Some("Band".to_owned())),
            ("title".to_owned(), Some("Song".to_owned())),
        ]));

        assert_eq!(*titles.lock().unwrap(), [Some("Song".to_owned())]);
    }

    // --- volume ---

    #[test]
    fn initial_volume_is_applied() {
        let (player, _) = player();
        assert_eq!(player.volume(), 50);
        assert!((player.pipeline.volume - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn volume_changes_emit_once() {
        let (mut player, events) = player();

        player.set_volume(30);
        player.set_volume(30);
        player.set_volume(50);

        assert_eq!(player.volume(), 50);
        assert_eq!(
            take(&events),
            [Event::Volume { value: 30 }, Event::Volume { value: 50 }]
        );
    }

    #[test]
    fn volume_is_clamped() {
        let (mut player, events) = player();
        player.set_volume(180);
        assert_eq!(player.volume(), 100);
        assert_eq!(take(&events), [Event::Volume { value: 100 }]);
    }

    #[test]
    fn percentage_rounds() {
        assert_eq!(percentage(0.0), 0);
        assert_eq!(percentage(0.294), 29);
        assert_eq!(percentage(0.296), 30);
        assert_eq!(percentage(1.5), 100);
    }

    // --- event loop ---

    #[tokio::test]
    async fn run_processes_commands_and_bus() {
        let (mut player, events) = player();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (bus, bus_rx) = mpsc::unbounded_channel();

        commands.send(Command::Start(STATION.to_owned())).unwrap();
        {
            let run = player.run(command_rx, bus_rx);
            tokio::pin!(run);

            // Give the loop time to resolve, install the playlist, and
            // consume the bus message before shutting down.
            tokio::select! {
                () = &mut run => panic!("event loop exited early"),
                () = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            bus.send(state_changed(EngineState::Playing)).unwrap();
            tokio::select! {
                () = &mut run => panic!("event loop exited early"),
                () = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            commands.send(Command::SetVolume(20)).unwrap();
            commands.send(Command::Shutdown).unwrap();
            run.await;
        }

        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.playlist().is_empty());
        let events = take(&events);
        assert_eq!(
            events.first(),
            Some(&changed(PlaybackState::Stopped, PlaybackState::GettingMetadata))
        );
        assert_eq!(
            events.last(),
            Some(&changed(PlaybackState::Playing, PlaybackState::Stopped))
        );
        assert!(events.contains(&Event::Volume { value: 20 }));
    }
}
