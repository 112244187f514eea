//! Error taxonomy.  None of these are fatal once the daemon is running: each
//! one ends the current tick's work for its path and the next tick retries.

use std::time::Duration;
use thiserror::Error;

use crate::session::{SessionEvent, SessionState};

/// The OS scripting bridge failed.  Swallowed inside the bridge, which then
/// reports an empty answer.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("osascript binary not found")]
    NotFound,
    #[error("failed to run osascript: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("osascript exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("player query timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} redirected without a usable Location header")]
    BadRedirect { url: String },
    #[error("gave up on {url} after {hops} redirects")]
    TooManyRedirects { url: String, hops: usize },
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no station id found on the lookup page for {0:?}")]
    NoStationId(String),
    #[error("now-playing response for station {0} was empty")]
    EmptyNowPlaying(String),
    #[error("now-playing response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("presence session is not connected")]
    NotConnected,
    #[error("presence transport rejected the activity: {0}")]
    Rejected(String),
    #[error("presence session actor is gone")]
    SessionGone,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session transition {event:?} from {from:?}")]
pub struct TransitionError {
    pub from: SessionState,
    pub event: SessionEvent,
}
