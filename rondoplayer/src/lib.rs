//! Backend-agnostic player contracts.
//!
//! This crate defines the surface every playback backend driver
//! satisfies:
//! - [`Track`] and best-effort metadata interpolation,
//! - the [`Library`], [`Playlist`] and [`Player`] traits,
//! - [`Emitter`], the per-player event bus,
//! - [`PlaylistMetaKeeper`], the overlay preserving client-supplied
//!   track metadata across backends that cannot store it.
//!
//! Drivers live in their own crates (see `rondoslim` for the reference
//! line-protocol backend); the HTTP facade consumes only these traits.

mod error;
mod event;
mod metakeeper;
mod player;
mod track;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{PlayerError, Result};
pub use event::{Emitter, PlayerEvent, Subscription, SUBSCRIBER_BUFFER};
pub use metakeeper::PlaylistMetaKeeper;
pub use player::{Library, PlayState, Player, Playlist, TrackArt};
pub use track::{interpolate_missing_fields, Track};
