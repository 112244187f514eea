//! Station resolution: display name → station id → now-playing track data.
//!
//! ```text
//!   refresh(name)
//!     ├── name == active station  → fetch_now_playing(active.id)
//!     └── otherwise               → resolve(name)       (memoized by name)
//!                                     └── lookup page → `stationPage = { id: '…' }`
//!                                   fetch_now_playing(id)
//!                                   active = record
//! ```
//!
//! Icon keys come from a name → key table loaded once at startup.  A missing
//! table just means every station uses its own name as the key.

use presence_proto::config::StationsConfig;
use presence_proto::protocol::{NowPlaying, StationRecord};
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::error::{FetchError, ResolutionError};
use crate::fetch::Fetcher;

const MISSING: &str = "N/A";

/// One element of the now-playing array.  Other fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NowPlayingEntry {
    #[serde(default)]
    song_name: Option<String>,
    #[serde(default)]
    artist_name: Option<String>,
    #[serde(default)]
    album_name: Option<String>,
    #[serde(default)]
    stream_title: Option<String>,
}

fn station_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"stationPage\s*=\s*\{\s*"?id"?\s*:\s*['"](\d+)['"]"#)
            .expect("station id pattern is valid")
    })
}

/// Pull the numeric station id out of a lookup page.
pub fn parse_station_id(page: &str) -> Option<String> {
    station_id_pattern()
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a combined `"Artist - Track"` stream title.
pub fn split_stream_title(title: &str) -> (Option<String>, Option<String>) {
    let mut parts = title.split(" - ");
    let artist = non_empty(parts.next().map(str::to_string));
    let track = non_empty(parts.next().map(str::to_string));
    (artist, track)
}

fn now_playing_from_entry(entry: NowPlayingEntry) -> NowPlaying {
    let mut artist = non_empty(entry.artist_name);
    let mut track = non_empty(entry.song_name);

    if artist.is_none() || track.is_none() {
        if let Some(title) = non_empty(entry.stream_title) {
            let (split_artist, split_track) = split_stream_title(&title);
            artist = artist.or(split_artist);
            track = track.or(split_track);
        }
    }

    NowPlaying {
        track: track.unwrap_or_else(|| MISSING.to_string()),
        artist: artist.unwrap_or_else(|| MISSING.to_string()),
        album: non_empty(entry.album_name),
    }
}

/// Decode a now-playing response body.
pub fn parse_now_playing(station_id: &str, body: &str) -> Result<NowPlaying, ResolutionError> {
    let entries: Vec<NowPlayingEntry> = serde_json::from_str(body)?;
    entries
        .into_iter()
        .next()
        .map(now_playing_from_entry)
        .ok_or_else(|| ResolutionError::EmptyNowPlaying(station_id.to_string()))
}

/// Fetch the name → icon key table.  Never fails: problems are logged and an
/// empty table is returned.
pub async fn load_icon_map(fetcher: &dyn Fetcher, url: &str) -> HashMap<String, String> {
    if url.is_empty() {
        info!("stations: no icon map configured, using station names as icon keys");
        return HashMap::new();
    }

    let body = match fetcher.fetch_text(url).await {
        Ok(body) => body,
        Err(e) => {
            warn!("stations: icon map fetch failed: {}", e);
            return HashMap::new();
        }
    };

    match serde_json::from_str::<HashMap<String, String>>(&body) {
        Ok(map) => {
            info!("stations: loaded {} icon keys", map.len());
            map
        }
        Err(e) => {
            warn!("stations: icon map is not a name → key object: {}", e);
            HashMap::new()
        }
    }
}

pub struct StationResolver {
    fetcher: Arc<dyn Fetcher>,
    lookup_url: String,
    nowplaying_url: String,
    api_key: String,
    icons: HashMap<String, String>,
    /// Names already resolved to an id.
    resolved: HashMap<String, StationRecord>,
    active: Option<StationRecord>,
}

impl StationResolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        config: &StationsConfig,
        icons: HashMap<String, String>,
    ) -> Self {
        Self {
            fetcher,
            lookup_url: config.lookup_url.clone(),
            nowplaying_url: config.nowplaying_url.clone(),
            api_key: config.api_key.clone(),
            icons,
            resolved: HashMap::new(),
            active: None,
        }
    }

    pub fn icon_key(&self, name: &str) -> String {
        self.icons
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The station whose track data was most recently refreshed.
    pub fn active(&self) -> Option<&StationRecord> {
        self.active.as_ref()
    }

    pub fn lookup_url_for(&self, name: &str) -> String {
        self.lookup_url.replace("{name}", &urlencoding::encode(name))
    }

    pub fn now_playing_url_for(&self, station_id: &str) -> Result<String, FetchError> {
        Url::parse_with_params(
            &self.nowplaying_url,
            &[
                ("apikey", self.api_key.as_str()),
                ("numberoftitles", "1"),
                ("station", station_id),
            ],
        )
        .map(String::from)
        .map_err(|_| FetchError::InvalidUrl(self.nowplaying_url.clone()))
    }

    /// Resolve a display name to its station record, hitting the network
    /// only the first time a name is seen.
    pub async fn resolve(&mut self, name: &str) -> Result<StationRecord, ResolutionError> {
        if let Some(record) = self.resolved.get(name) {
            return Ok(record.clone());
        }

        let url = self.lookup_url_for(name);
        debug!("stations: resolving {:?} via {}", name, url);
        let page = self.fetcher.fetch_text(&url).await?;
        let station_id =
            parse_station_id(&page).ok_or_else(|| ResolutionError::NoStationId(name.to_string()))?;

        let record = StationRecord {
            display_name: name.to_string(),
            station_id,
            icon_key: self.icon_key(name),
        };
        info!(
            "stations: {:?} resolved to id {} (icon {:?})",
            name, record.station_id, record.icon_key
        );
        self.resolved.insert(name.to_string(), record.clone());
        Ok(record)
    }

    pub async fn fetch_now_playing(&self, station_id: &str) -> Result<NowPlaying, ResolutionError> {
        let url = self.now_playing_url_for(station_id)?;
        let body = self.fetcher.fetch_text(&url).await?;
        parse_now_playing(station_id, &body)
    }

    /// Current track data for `name`.  The active station is refreshed
    /// directly; a new name is resolved first and becomes active only once
    /// its track data arrived.
    pub async fn refresh(
        &mut self,
        name: &str,
    ) -> Result<(StationRecord, NowPlaying), ResolutionError> {
        let cached = self
            .active
            .as_ref()
            .filter(|active| active.display_name == name)
            .cloned();
        let record = match cached {
            Some(active) => active,
            None => self.resolve(name).await?,
        };

        let now = self.fetch_now_playing(&record.station_id).await?;
        self.active = Some(record.clone());
        Ok((record, now))
    }
}
