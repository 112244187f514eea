use serde::{Deserialize, Serialize};

/// Which presence identity is in use.  Local library playback and internet
/// radio are registered as two separate presence applications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Local,
    Station,
}

impl Profile {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Station => "station",
        }
    }
}

/// What the player reports for the current track on one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackFacts {
    /// Track name, or the station name while streaming.
    pub name: String,
    pub artist: String,
    pub album: String,
}

/// How a set of facts should be mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactsKind {
    /// Name, artist and album all present.
    Complete,
    /// Only a name: the player is streaming a station.
    StationCandidate,
    /// Nothing usable (empty name, or a partial tag set).
    Unclassified,
}

impl PlaybackFacts {
    pub fn new(name: impl Into<String>, artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.artist.is_empty() && !self.album.is_empty()
    }

    pub fn is_station_candidate(&self) -> bool {
        !self.name.is_empty() && self.artist.is_empty() && self.album.is_empty()
    }

    pub fn kind(&self) -> FactsKind {
        if self.is_complete() {
            FactsKind::Complete
        } else if self.is_station_candidate() {
            FactsKind::StationCandidate
        } else {
            FactsKind::Unclassified
        }
    }

    /// Profile implied by the content, if the facts are usable at all.
    pub fn implied_profile(&self) -> Option<Profile> {
        match self.kind() {
            FactsKind::Complete => Some(Profile::Local),
            FactsKind::StationCandidate => Some(Profile::Station),
            FactsKind::Unclassified => None,
        }
    }
}

/// A station display name resolved against the station directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub display_name: String,
    pub station_id: String,
    pub icon_key: String,
}

/// Track data reported by the station's now-playing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub track: String,
    pub artist: String,
    pub album: Option<String>,
}

/// Outbound activity.  Rebuilt from scratch for every send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub details: String,
    pub state: String,
    pub image_text: String,
    /// Unix epoch milliseconds the elapsed-time counter starts from.
    pub start_timestamp: i64,
    pub large_image_key: String,
    pub small_image_key: String,
    pub small_image_text: String,
}

/// Serializable view of the presence session for the status API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting { profile: Profile },
    Connected { profile: Profile },
}

/// Everything the daemon publishes about itself after each event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session: SessionStatus,
    pub active_profile: Profile,
    pub player_state: Option<String>,
    /// Facts of the last local-mode send.
    pub last_local: Option<PlaybackFacts>,
    pub active_station: Option<StationRecord>,
    pub last_now_playing: Option<NowPlaying>,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub sends: u64,
    pub teardowns: u64,
}
