/// Presence session lifecycle.
///
/// State machine (every change goes through [`transition`]):
///
/// ```text
///   Disconnected ──ConnectRequested(p)──▶ Connecting{p} ──Ready──▶ Connected{p}
///        ▲                                   │                        │
///        └──────────── ConnectFailed ────────┘                        │
///        └──────────── Teardown (destroy + recreate) ◀────────────────┘
/// ```
///
/// There is no `Connected{a} → Connected{b}` edge: a profile switch is a
/// teardown followed by a fresh connect on a *new* session object.  The
/// transport does not reliably report success when an object whose
/// connection was closed while idle is asked to connect again, so objects
/// are never reused after a teardown.
use async_trait::async_trait;
use presence_proto::protocol::{PresencePayload, Profile, SessionStatus};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{SendError, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting {
        profile: Profile,
    },
    Connected {
        profile: Profile,
    },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match *self {
            Self::Disconnected => SessionStatus::Disconnected,
            Self::Connecting { profile } => SessionStatus::Connecting { profile },
            Self::Connected { profile } => SessionStatus::Connected { profile },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectRequested(Profile),
    Ready,
    ConnectFailed,
    Teardown,
}

pub fn transition(from: SessionState, event: SessionEvent) -> Result<SessionState, TransitionError> {
    use SessionEvent::*;
    use SessionState::*;

    match (from, event) {
        (Disconnected, ConnectRequested(profile)) => Ok(Connecting { profile }),
        (Connecting { profile }, Ready) => Ok(Connected { profile }),
        (Connecting { .. }, ConnectFailed) => Ok(Disconnected),
        (Connecting { .. } | Connected { .. }, Teardown) => Ok(Disconnected),
        _ => Err(TransitionError { from, event }),
    }
}

/// Outcome of a connect attempt, delivered asynchronously.  Tagged with the
/// generation of the session object that produced it so signals from a
/// destroyed object are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    Ready { generation: u64 },
    Failed { generation: u64, reason: String },
}

impl SessionSignal {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Ready { generation } | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// One remote presence connection.
#[async_trait]
pub trait PresenceSession: Send {
    /// Start connecting as application `app_id`.  Returns as soon as the
    /// attempt is under way; the result arrives later as a [`SessionSignal`].
    async fn connect(&mut self, app_id: &str);

    async fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), SendError>;

    /// Clear the activity and release the transport.  The object is not used
    /// again afterwards.
    async fn destroy(&mut self);
}

/// Builds a fresh session object for every generation.
pub trait SessionFactory: Send {
    fn create(&mut self, generation: u64) -> Box<dyn PresenceSession>;
}

/// Presence application id per profile.
#[derive(Debug, Clone)]
pub struct ProfileIds {
    pub local: String,
    pub station: String,
}

impl ProfileIds {
    pub fn app_id(&self, profile: Profile) -> &str {
        match profile {
            Profile::Local => &self.local,
            Profile::Station => &self.station,
        }
    }
}

pub struct SessionManager {
    factory: Box<dyn SessionFactory>,
    session: Box<dyn PresenceSession>,
    generation: u64,
    state: SessionState,
    active_profile: Profile,
    ids: ProfileIds,
    connecting_since: Option<Instant>,
}

impl SessionManager {
    pub fn new(mut factory: Box<dyn SessionFactory>, ids: ProfileIds) -> Self {
        let generation = 1;
        let session = factory.create(generation);
        Self {
            factory,
            session,
            generation,
            state: SessionState::Disconnected,
            active_profile: Profile::Local,
            ids,
            connecting_since: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_profile(&self) -> Profile {
        self.active_profile
    }

    /// Pick the profile the next connect uses.  Only meaningful while
    /// disconnected; a connected session must be torn down first.
    pub fn set_active_profile(&mut self, profile: Profile) {
        if self.active_profile != profile {
            debug!(
                "session: active profile {} -> {}",
                self.active_profile.label(),
                profile.label()
            );
        }
        self.active_profile = profile;
    }

    fn apply(&mut self, event: SessionEvent) -> Result<SessionState, TransitionError> {
        let next = transition(self.state, event)?;
        debug!("session: {:?} --{:?}--> {:?}", self.state, event, next);
        self.state = next;
        Ok(next)
    }

    /// Fire-and-forget connect with the active profile.
    pub async fn connect(&mut self) -> Result<(), TransitionError> {
        let profile = self.active_profile;
        self.apply(SessionEvent::ConnectRequested(profile))?;
        self.connecting_since = Some(Instant::now());
        info!(
            "session: connecting gen={} profile={}",
            self.generation,
            profile.label()
        );
        self.session.connect(self.ids.app_id(profile)).await;
        Ok(())
    }

    /// Apply an asynchronous connect outcome.  Returns the new state, or
    /// `None` when the signal was stale or did not fit the current state.
    pub fn on_signal(&mut self, signal: SessionSignal) -> Option<SessionState> {
        if signal.generation() != self.generation {
            debug!(
                "session: ignoring signal from gen={} (current gen={})",
                signal.generation(),
                self.generation
            );
            return None;
        }

        let event = match &signal {
            SessionSignal::Ready { .. } => SessionEvent::Ready,
            SessionSignal::Failed { reason, .. } => {
                warn!("session: connect failed: {}", reason);
                SessionEvent::ConnectFailed
            }
        };

        match self.apply(event) {
            Ok(next) => {
                self.connecting_since = None;
                Some(next)
            }
            Err(e) => {
                warn!("session: {}", e);
                None
            }
        }
    }

    /// How long the current connect attempt has been pending.
    pub fn connecting_for(&self) -> Option<Duration> {
        self.connecting_since.map(|since| since.elapsed())
    }

    /// Destroy the current session object and replace it with a new one.
    pub async fn teardown(&mut self) -> Result<(), TransitionError> {
        self.apply(SessionEvent::Teardown)?;
        self.connecting_since = None;
        self.session.destroy().await;
        self.generation += 1;
        self.session = self.factory.create(self.generation);
        info!("session: recreated as gen={}", self.generation);
        Ok(())
    }

    pub async fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), SendError> {
        if !matches!(self.state, SessionState::Connected { .. }) {
            return Err(SendError::NotConnected);
        }
        self.session.set_activity(payload).await
    }

    /// Release the session for good (daemon shutdown).
    pub async fn shutdown(&mut self) {
        self.session.destroy().await;
        self.state = SessionState::Disconnected;
        self.connecting_since = None;
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Everything the fake sessions were asked to do, across generations.
    #[derive(Debug, Default)]
    pub struct Journal {
        pub created: Vec<u64>,
        pub connects: Vec<(u64, String)>,
        pub activities: Vec<PresencePayload>,
        pub destroyed: Vec<u64>,
        pub reject_activities: bool,
    }

    #[derive(Clone, Default)]
    pub struct RecordingFactory {
        pub journal: Arc<Mutex<Journal>>,
    }

    impl SessionFactory for RecordingFactory {
        fn create(&mut self, generation: u64) -> Box<dyn PresenceSession> {
            self.journal.lock().unwrap().created.push(generation);
            Box::new(RecordingSession {
                generation,
                journal: self.journal.clone(),
            })
        }
    }

    struct RecordingSession {
        generation: u64,
        journal: Arc<Mutex<Journal>>,
    }

    #[async_trait]
    impl PresenceSession for RecordingSession {
        async fn connect(&mut self, app_id: &str) {
            self.journal
                .lock()
                .unwrap()
                .connects
                .push((self.generation, app_id.to_string()));
        }

        async fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), SendError> {
            let mut journal = self.journal.lock().unwrap();
            if journal.reject_activities {
                return Err(SendError::Rejected("closed".to_string()));
            }
            journal.activities.push(payload.clone());
            Ok(())
        }

        async fn destroy(&mut self) {
            self.journal.lock().unwrap().destroyed.push(self.generation);
        }
    }

    pub fn ids() -> ProfileIds {
        ProfileIds {
            local: "local-app".to_string(),
            station: "station-app".to_string(),
        }
    }
}
