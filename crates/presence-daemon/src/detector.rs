//! Change detection over the two fingerprint lanes.
//!
//! A lane holds the fingerprint of the last *sent* activity for its data
//! source.  Comparison is pure; the caller commits only after a successful
//! send, so an observation that never made it out cannot suppress a later
//! identical send.

use presence_proto::protocol::{NowPlaying, PlaybackFacts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Local,
    Station,
}

impl Lane {
    pub fn other(self) -> Self {
        match self {
            Self::Local => Self::Station,
            Self::Station => Self::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Local {
        name: String,
        artist: String,
        album: String,
    },
    Station {
        station: String,
        track: String,
        artist: String,
        album: Option<String>,
    },
}

impl Fingerprint {
    pub fn local(facts: &PlaybackFacts) -> Self {
        Self::Local {
            name: facts.name.clone(),
            artist: facts.artist.clone(),
            album: facts.album.clone(),
        }
    }

    pub fn station(station: &str, now: &NowPlaying) -> Self {
        Self::Station {
            station: station.to_string(),
            track: now.track.clone(),
            artist: now.artist.clone(),
            album: now.album.clone(),
        }
    }

    pub fn lane(&self) -> Lane {
        match self {
            Self::Local { .. } => Lane::Local,
            Self::Station { .. } => Lane::Station,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChangeDetector {
    local: Option<Fingerprint>,
    station: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, lane: Lane) -> &Option<Fingerprint> {
        match lane {
            Lane::Local => &self.local,
            Lane::Station => &self.station,
        }
    }

    fn slot_mut(&mut self, lane: Lane) -> &mut Option<Fingerprint> {
        match lane {
            Lane::Local => &mut self.local,
            Lane::Station => &mut self.station,
        }
    }

    /// Compare `next` against the last committed fingerprint of its lane.
    pub fn changed(&self, next: Fingerprint) -> (bool, Fingerprint) {
        let is_changed = self.slot(next.lane()).as_ref() != Some(&next);
        (is_changed, next)
    }

    /// Record a sent fingerprint and forget the other lane, so returning to
    /// it later always counts as new.
    pub fn commit(&mut self, fingerprint: Fingerprint) {
        let lane = fingerprint.lane();
        *self.slot_mut(lane.other()) = None;
        *self.slot_mut(lane) = Some(fingerprint);
    }

    pub fn reset_all(&mut self) {
        self.local = None;
        self.station = None;
    }

    #[cfg(test)]
    pub fn last(&self, lane: Lane) -> Option<&Fingerprint> {
        self.slot(lane).as_ref()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.station.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(artist: &str) -> Fingerprint {
        Fingerprint::local(&PlaybackFacts::new("Song A", artist, "Album Y"))
    }

    fn on_air(track: &str) -> Fingerprint {
        Fingerprint::station(
            "StationName",
            &NowPlaying {
                track: track.to_string(),
                artist: "Someone".to_string(),
                album: None,
            },
        )
    }

    #[test]
    fn test_repeat_is_suppressed_only_after_commit() {
        let mut det = ChangeDetector::new();

        let (changed, fp) = det.changed(song("Artist X"));
        assert!(changed);
        // Not sent yet: still counts as changed.
        assert!(det.changed(song("Artist X")).0);

        det.commit(fp);
        assert!(!det.changed(song("Artist X")).0);
        assert!(det.changed(song("Artist Z")).0);
    }

    #[test]
    fn test_commit_resets_only_the_other_lane() {
        let mut det = ChangeDetector::new();
        det.commit(song("Artist X"));
        assert!(det.last(Lane::Local).is_some());

        det.commit(on_air("Track 1"));
        assert!(det.last(Lane::Local).is_none());
        assert_eq!(det.last(Lane::Station), Some(&on_air("Track 1")));

        // Back to local: the same song is new again, station lane is dropped.
        assert!(det.changed(song("Artist X")).0);
        det.commit(song("Artist X"));
        assert!(det.last(Lane::Station).is_none());
        assert!(det.last(Lane::Local).is_some());
    }

    #[test]
    fn test_reset_all() {
        let mut det = ChangeDetector::new();
        det.commit(on_air("Track 1"));
        det.reset_all();
        assert!(det.is_empty());
        assert!(det.changed(on_air("Track 1")).0);
    }
}
