/// DaemonCore: single-owner event loop for all mutable state.
///
/// Every input (poll ticks, session connect outcomes, HTTP refresh requests,
/// shutdown) arrives as a `DaemonEvent` on one channel and is handled to
/// completion before the next one is read.  That is what keeps ticks from
/// overlapping: a slow player query or station fetch simply delays the next
/// event, it never interleaves with it.
///
/// DaemonCore owns the session manager, the change detector and the station
/// resolver exclusively; no other task touches them.  After each event it
/// publishes a `StatusSnapshot` to the shared `StatusBoard`.
///
/// Per tick:
///
/// ```text
///   player state != "playing" ── session up? ──▶ teardown + recreate, clear lanes
///   player state == "playing"
///     facts → requested profile (local if complete, station if name only)
///     Disconnected           ──▶ connect(requested)
///     Connecting             ──▶ wait (recreate after connect timeout)
///     Connected(p ≠ request) ──▶ teardown + recreate, switch profile
///     Connected(p)           ──▶ complete facts → local lane
///                                name only      → station lane
/// ```
use std::sync::Arc;
use std::time::Duration;

use presence_proto::config::Config;
use presence_proto::protocol::{FactsKind, NowPlaying, PlaybackFacts, StatusSnapshot};
use presence_proto::state::StatusBoard;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::detector::{ChangeDetector, Fingerprint};
use crate::discord::DiscordSessionFactory;
use crate::error::SendError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::player::{OsaScriptBridge, Player, PLAYING};
use crate::presence::{PresenceFormatter, SystemClock};
use crate::session::{ProfileIds, SessionManager, SessionSignal, SessionState};
use crate::station::{load_icon_map, StationResolver};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// Poll the player and reconcile.
    Tick,
    /// Connect outcome reported by a session object.
    Session(SessionSignal),
    /// Out-of-schedule tick requested through the HTTP API.
    Refresh,
    /// Shutdown requested.
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    player: Player,
    detector: ChangeDetector,
    resolver: StationResolver,
    formatter: PresenceFormatter,
    sessions: SessionManager,
    board: StatusBoard,
    event_tx: mpsc::Sender<DaemonEvent>,
    interval: Duration,
    connect_timeout: Duration,
    /// Last raw player state string.
    player_state: Option<String>,
    /// Facts of the last successful local-mode send.
    last_local: Option<PlaybackFacts>,
    last_now_playing: Option<NowPlaying>,
    last_error: Option<String>,
    ticks: u64,
    sends: u64,
    teardowns: u64,
}

impl DaemonCore {
    /// Wire the production collaborators: osascript, reqwest, Discord IPC.
    pub async fn from_config(
        config: &Config,
        board: StatusBoard,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> anyhow::Result<Self> {
        let bridge = Arc::new(OsaScriptBridge::new(Duration::from_secs(
            config.poll.query_timeout_secs,
        )));
        let player = Player::new(bridge, config.poll.player_app.clone());

        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
            Duration::from_secs(config.stations.fetch_timeout_secs),
            config.stations.max_redirects,
        )?);
        let icons = load_icon_map(fetcher.as_ref(), &config.stations.icon_map_url).await;
        let resolver = StationResolver::new(fetcher, &config.stations, icons);

        let formatter = PresenceFormatter::new(&config.presence, Arc::new(SystemClock));
        let sessions = SessionManager::new(
            Box::new(DiscordSessionFactory::new(event_tx.clone())),
            ProfileIds {
                local: config.presence.local_app_id.clone(),
                station: config.presence.station_app_id.clone(),
            },
        );

        Ok(Self::new(
            player,
            resolver,
            formatter,
            sessions,
            board,
            event_tx,
            Duration::from_secs(config.poll.interval_secs.max(1)),
            Duration::from_secs(config.poll.connect_timeout_secs),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        player: Player,
        resolver: StationResolver,
        formatter: PresenceFormatter,
        sessions: SessionManager,
        board: StatusBoard,
        event_tx: mpsc::Sender<DaemonEvent>,
        interval: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            player,
            detector: ChangeDetector::new(),
            resolver,
            formatter,
            sessions,
            board,
            event_tx,
            interval,
            connect_timeout,
            player_state: None,
            last_local: None,
            last_now_playing: None,
            last_error: None,
            ticks: 0,
            sends: 0,
            teardowns: 0,
        }
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop, polling every {:?}", self.interval);

        let ticker_tx = self.event_tx.clone();
        let interval = self.interval;
        let ticker = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if ticker_tx.send(DaemonEvent::Tick).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match event_rx.recv().await {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }
                Some(DaemonEvent::Shutdown) => {
                    info!("DaemonCore: shutdown requested");
                    break;
                }
                Some(evt) => self.handle_event(evt).await,
            }
        }

        ticker.abort();
        self.sessions.shutdown().await;
        self.publish().await;
        Ok(())
    }

    pub async fn handle_event(&mut self, evt: DaemonEvent) {
        match evt {
            DaemonEvent::Tick | DaemonEvent::Refresh => self.tick().await,
            DaemonEvent::Session(signal) => match self.sessions.on_signal(signal) {
                Some(SessionState::Connected { profile }) => {
                    info!("DaemonCore: session connected ({})", profile.label());
                    // The connect may have finished well after the tick that
                    // asked for it; evaluate right away instead of waiting.
                    self.tick().await;
                }
                Some(state) => debug!("DaemonCore: session now {:?}", state),
                None => {}
            },
            DaemonEvent::Shutdown => {}
        }
        self.publish().await;
    }

    // ── tick ──────────────────────────────────────────────────────────────────

    async fn tick(&mut self) {
        self.ticks += 1;

        let state = self.player.state().await;
        let playing = state == PLAYING;
        self.player_state = Some(state);

        if !playing {
            if self.sessions.state() != SessionState::Disconnected {
                self.teardown("playback stopped").await;
            }
            return;
        }

        let facts = self.player.facts().await;
        let requested = facts
            .implied_profile()
            .unwrap_or_else(|| self.sessions.active_profile());

        match self.sessions.state() {
            SessionState::Disconnected => {
                self.sessions.set_active_profile(requested);
                if let Err(e) = self.sessions.connect().await {
                    warn!("DaemonCore: {}", e);
                }
            }
            SessionState::Connecting { .. } => {
                let waited = self.sessions.connecting_for().unwrap_or_default();
                if waited >= self.connect_timeout {
                    warn!("DaemonCore: connect pending for {:?}, recreating session", waited);
                    self.teardown("connect timed out").await;
                } else {
                    debug!("DaemonCore: waiting for session ({:?})", waited);
                }
            }
            SessionState::Connected { profile } if profile != requested => {
                info!(
                    "DaemonCore: switching profile {} -> {}",
                    profile.label(),
                    requested.label()
                );
                self.teardown("profile switch").await;
                self.sessions.set_active_profile(requested);
            }
            SessionState::Connected { .. } => self.reconcile(facts).await,
        }
    }

    async fn reconcile(&mut self, facts: PlaybackFacts) {
        match facts.kind() {
            FactsKind::Complete => self.mirror_local(facts).await,
            FactsKind::StationCandidate => self.mirror_station(&facts.name).await,
            FactsKind::Unclassified => debug!("DaemonCore: nothing to mirror in {:?}", facts),
        }
    }

    async fn mirror_local(&mut self, facts: PlaybackFacts) {
        let (changed, fingerprint) = self.detector.changed(Fingerprint::local(&facts));
        if !changed {
            return;
        }

        let payload = self.formatter.local(&self.player, &facts).await;
        match self.formatter.send_activity(&mut self.sessions, payload).await {
            Ok(()) => {
                info!(
                    "DaemonCore: now playing {:?} by {:?}",
                    facts.name, facts.artist
                );
                self.committed(fingerprint);
                self.last_local = Some(facts);
            }
            Err(e) => self.send_failed(e).await,
        }
    }

    async fn mirror_station(&mut self, name: &str) {
        let (record, now) = match self.resolver.refresh(name).await {
            Ok(found) => found,
            Err(e) => {
                warn!("DaemonCore: station {:?}: {}", name, e);
                self.last_error = Some(e.to_string());
                return;
            }
        };

        let (changed, fingerprint) = self
            .detector
            .changed(Fingerprint::station(&record.display_name, &now));
        self.last_now_playing = Some(now.clone());
        if !changed {
            return;
        }

        let payload = self
            .formatter
            .station_payload(self.resolver.active(), name, &now);
        match self.formatter.send_activity(&mut self.sessions, payload).await {
            Ok(()) => {
                info!(
                    "DaemonCore: {} on air: {:?} by {:?}",
                    record.display_name, now.track, now.artist
                );
                self.committed(fingerprint);
            }
            Err(e) => self.send_failed(e).await,
        }
    }

    fn committed(&mut self, fingerprint: Fingerprint) {
        self.detector.commit(fingerprint);
        self.sends += 1;
        self.last_error = None;
    }

    /// A transport that rejected a send, or whose actor died, does not come
    /// back by itself: replace it so the next tick reconnects.
    async fn send_failed(&mut self, e: SendError) {
        self.last_error = Some(e.to_string());
        match e {
            SendError::Rejected(_) | SendError::SessionGone => {
                self.teardown("send failed").await
            }
            SendError::NotConnected => {}
        }
    }

    /// Destroy the session object, build a fresh one and forget what was sent.
    async fn teardown(&mut self, reason: &str) {
        match self.sessions.teardown().await {
            Ok(()) => {
                info!("DaemonCore: session torn down ({})", reason);
                self.detector.reset_all();
                self.teardowns += 1;
            }
            Err(e) => warn!("DaemonCore: {}", e),
        }
    }

    // ── status ────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            session: self.sessions.state().status(),
            active_profile: self.sessions.active_profile(),
            player_state: self.player_state.clone(),
            last_local: self.last_local.clone(),
            active_station: self.resolver.active().cloned(),
            last_now_playing: self.last_now_playing.clone(),
            last_error: self.last_error.clone(),
            ticks: self.ticks,
            sends: self.sends,
            teardowns: self.teardowns,
        }
    }

    async fn publish(&self) {
        self.board.publish(self.snapshot()).await;
    }
}
