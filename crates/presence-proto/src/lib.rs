//! Shared types for the music-presence daemon: configuration, platform
//! paths, the playback/presence data model and the status board read by the
//! HTTP API.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
