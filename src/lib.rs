//! Internet radio playback controller.
//!
//! `streamtune` turns a station URL into something a media engine can play:
//!
//! 1. The URL is fetched over HTTP ([`http`], [`resolver`]).
//! 2. The response is sniffed for a known playlist format ([`format`]) and
//!    the stream URIs are extracted. Unrecognized responses are played as
//!    the stream itself.
//! 3. The [`player`] hands URIs to a [`pipeline`] one at a time, falling
//!    back to the next on end of stream or error, and reports progress as
//!    [`events`].
//!
//! Audio decoding and output are left to the [`pipeline::Pipeline`]
//! implementation.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod http;
pub mod pipeline;
pub mod player;
pub mod resolver;
pub mod transport;
