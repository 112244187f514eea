use presence_proto::config::PresenceConfig;
use presence_proto::protocol::{NowPlaying, PlaybackFacts, PresencePayload, StationRecord};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::player::Player;
use crate::session::SessionManager;

/// Longest text the presence service accepts in one field.
const MAX_FIELD_CHARS: usize = 128;
/// Shortest text it accepts; shorter fields get the whole activity rejected.
const MIN_FIELD_CHARS: usize = 2;
/// Blank filler that survives whitespace trimming on the remote side.
const PAD: char = '\u{2800}';

pub trait Clock: Send + Sync {
    /// Current Unix time in milliseconds.
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn fit(text: &str) -> String {
    let len = text.chars().count();
    if len < MIN_FIELD_CHARS {
        let mut padded = text.to_string();
        padded.extend(std::iter::repeat(PAD).take(MIN_FIELD_CHARS - len));
        return padded;
    }
    if len <= MAX_FIELD_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_FIELD_CHARS - 1).collect();
    cut.push('…');
    cut
}

pub struct PresenceFormatter {
    default_large_image: String,
    small_image: String,
    small_text: String,
    clock: Arc<dyn Clock>,
}

impl PresenceFormatter {
    pub fn new(config: &PresenceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_large_image: config.default_large_image.clone(),
            small_image: config.small_image.clone(),
            small_text: concat!("music-presence v", env!("CARGO_PKG_VERSION")).to_string(),
            clock,
        }
    }

    /// Payload for a library track.  The start timestamp is backdated by the
    /// elapsed position so the remote side keeps counting on its own.
    pub fn local_payload(
        &self,
        facts: &PlaybackFacts,
        elapsed_secs: Option<f64>,
        duration_secs: Option<f64>,
    ) -> PresencePayload {
        let elapsed_ms = (elapsed_secs.unwrap_or(0.0) * 1000.0) as i64;
        let details = match duration_secs {
            Some(d) => format!("{} ({})", facts.name, format_duration(d)),
            None => facts.name.clone(),
        };

        PresencePayload {
            details: fit(&details),
            state: fit(&format!("by {}", facts.artist)),
            image_text: fit(&facts.album),
            start_timestamp: self.clock.now_millis() - elapsed_ms,
            large_image_key: self.default_large_image.clone(),
            ..PresencePayload::default()
        }
    }

    /// Query position and duration from the player, then build the local
    /// payload.
    pub async fn local(&self, player: &Player, facts: &PlaybackFacts) -> PresencePayload {
        let elapsed = player.position().await;
        let duration = player.duration().await;
        self.local_payload(facts, elapsed, duration)
    }

    /// Payload for a live stream: no elapsed position, the counter starts now.
    pub fn station_payload(
        &self,
        active: Option<&StationRecord>,
        station_name: &str,
        now: &NowPlaying,
    ) -> PresencePayload {
        let image_text = now.album.as_deref().unwrap_or(station_name);
        let large_image_key = active
            .map(|s| s.icon_key.clone())
            .unwrap_or_else(|| self.default_large_image.clone());

        PresencePayload {
            details: fit(&now.track),
            state: fit(&format!("by {}", now.artist)),
            image_text: fit(image_text),
            start_timestamp: self.clock.now_millis(),
            large_image_key,
            ..PresencePayload::default()
        }
    }

    /// Add branding and hand the payload to the session.  Failures are
    /// logged and returned so the caller can decide whether the session is
    /// still usable.
    pub async fn send_activity(
        &self,
        sessions: &mut SessionManager,
        mut payload: PresencePayload,
    ) -> Result<(), SendError> {
        payload.small_image_key = self.small_image.clone();
        payload.small_image_text = self.small_text.clone();

        match sessions.set_activity(&payload).await {
            Ok(()) => {
                debug!("presence: sent {:?} / {:?}", payload.details, payload.state);
                Ok(())
            }
            Err(e) => {
                warn!("presence: send failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Default)]
    pub struct FixedClock(pub AtomicI64);

    impl FixedClock {
        pub fn at(ms: i64) -> Self {
            Self(AtomicI64::new(ms))
        }

        pub fn set(&self, ms: i64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedClock;
    use super::*;
    use crate::session::testing::{ids, RecordingFactory};
    use crate::session::SessionSignal;

    const T: i64 = 1_700_000_000_000;

    fn formatter() -> PresenceFormatter {
        PresenceFormatter::new(&PresenceConfig::default(), Arc::new(FixedClock::at(T)))
    }

    fn station() -> StationRecord {
        StationRecord {
            display_name: "FIP".into(),
            station_id: "1".into(),
            icon_key: "fip_logo".into(),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(215.4), "3:35");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }

    #[test]
    fn test_local_timestamp_is_backdated() {
        let f = formatter();
        let facts = PlaybackFacts::new("Song A", "Artist X", "Album Y");

        let p = f.local_payload(&facts, Some(42.5), Some(215.0));
        assert_eq!(p.start_timestamp, T - 42_500);
        assert_eq!(p.details, "Song A (3:35)");
        assert_eq!(p.state, "by Artist X");
        assert_eq!(p.image_text, "Album Y");
        assert_eq!(p.large_image_key, "music");

        let p = f.local_payload(&facts, None, None);
        assert_eq!(p.start_timestamp, T);
        assert_eq!(p.details, "Song A");
    }

    #[test]
    fn test_station_payload() {
        let f = formatter();
        let now = NowPlaying {
            track: "Track Title".into(),
            artist: "Artist Name".into(),
            album: None,
        };

        let p = f.station_payload(Some(&station()), "FIP", &now);
        assert_eq!(p.start_timestamp, T);
        assert_eq!(p.details, "Track Title");
        assert_eq!(p.state, "by Artist Name");
        assert_eq!(p.image_text, "FIP");
        assert_eq!(p.large_image_key, "fip_logo");

        let with_album = NowPlaying {
            album: Some("Live LP".into()),
            ..now
        };
        let p = f.station_payload(None, "FIP", &with_album);
        assert_eq!(p.image_text, "Live LP");
        assert_eq!(p.large_image_key, "music");
    }

    #[test]
    fn test_long_fields_are_cut() {
        let f = formatter();
        let long = "x".repeat(300);
        let p = f.local_payload(&PlaybackFacts::new(long.as_str(), "A", "B"), None, None);
        assert_eq!(p.details.chars().count(), MAX_FIELD_CHARS);
        assert!(p.details.ends_with('…'));
    }

    #[test]
    fn test_short_fields_are_padded() {
        let f = formatter();
        let now = NowPlaying {
            track: "X".into(),
            artist: "Y".into(),
            album: None,
        };

        let p = f.station_payload(None, "FIP", &now);
        assert_eq!(p.details, "X\u{2800}");
        assert_eq!(p.details.chars().count(), MIN_FIELD_CHARS);
        assert_eq!(p.state, "by Y");

        assert_eq!(fit(""), "\u{2800}\u{2800}");
        assert_eq!(fit("ok"), "ok");
    }

    #[tokio::test]
    async fn test_send_activity_adds_branding() {
        let factory = RecordingFactory::default();
        let journal = factory.journal.clone();
        let mut sessions = SessionManager::new(Box::new(factory), ids());
        let f = formatter();
        let payload = f.local_payload(&PlaybackFacts::new("S", "A", "B"), None, None);

        // Not connected yet: logged, not sent.
        assert!(matches!(
            f.send_activity(&mut sessions, payload.clone()).await,
            Err(SendError::NotConnected)
        ));

        sessions.connect().await.unwrap();
        sessions.on_signal(SessionSignal::Ready { generation: 1 });
        assert!(f.send_activity(&mut sessions, payload).await.is_ok());

        journal.lock().unwrap().reject_activities = true;
        assert!(matches!(
            f.send_activity(&mut sessions, PresencePayload::default()).await,
            Err(SendError::Rejected(_))
        ));

        let j = journal.lock().unwrap();
        assert_eq!(j.activities.len(), 1);
        assert_eq!(j.activities[0].small_image_key, "logo");
        assert!(j.activities[0].small_image_text.starts_with("music-presence v"));
    }
}
