//! # Open Music Resolver
//!
//! Turns catalog links (tracks, playlists, user playlists, albums, artists)
//! and direct audio URLs into ordered track descriptors for an audio engine.
//!
//! The entry point is [`sources::SourceManager`], usually built with a
//! [`sources::SpotifySource`] followed by a [`sources::DirectUrlClient`].

pub mod cache;
pub mod config;
pub mod error;
pub mod sources;

pub use error::{CatalogError, ResolveError};
