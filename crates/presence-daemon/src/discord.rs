//! Discord Rich Presence transport.
//!
//! The IPC client is blocking, so every session object runs its own actor on
//! a dedicated OS thread and talks to it over channels.  Destroying the
//! session clears the activity, closes the socket and ends the thread; the
//! next generation gets a brand-new thread and client.

use async_trait::async_trait;
use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use presence_proto::protocol::PresencePayload;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::core::DaemonEvent;
use crate::error::SendError;
use crate::session::{PresenceSession, SessionFactory, SessionSignal};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const DESTROY_TIMEOUT: Duration = Duration::from_secs(2);

enum ActorCommand {
    Connect {
        app_id: String,
    },
    SetActivity {
        payload: PresencePayload,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Destroy {
        done: oneshot::Sender<()>,
    },
}

pub struct DiscordSessionFactory {
    events: mpsc::Sender<DaemonEvent>,
}

impl DiscordSessionFactory {
    pub fn new(events: mpsc::Sender<DaemonEvent>) -> Self {
        Self { events }
    }
}

impl SessionFactory for DiscordSessionFactory {
    fn create(&mut self, generation: u64) -> Box<dyn PresenceSession> {
        Box::new(DiscordSession::spawn(generation, self.events.clone()))
    }
}

pub struct DiscordSession {
    generation: u64,
    tx: std_mpsc::Sender<ActorCommand>,
    events: mpsc::Sender<DaemonEvent>,
}

impl DiscordSession {
    fn spawn(generation: u64, events: mpsc::Sender<DaemonEvent>) -> Self {
        let (tx, rx) = std_mpsc::channel();
        let actor_events = events.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("discord-rpc-{}", generation))
            .spawn(move || actor_loop(generation, rx, actor_events));
        if let Err(e) = spawned {
            // Commands will fail with SessionGone; connect reports Failed.
            error!("discord: failed to spawn actor thread: {}", e);
        }

        Self {
            generation,
            tx,
            events,
        }
    }
}

#[async_trait]
impl PresenceSession for DiscordSession {
    async fn connect(&mut self, app_id: &str) {
        let cmd = ActorCommand::Connect {
            app_id: app_id.to_string(),
        };
        if self.tx.send(cmd).is_err() {
            // Called from inside the core loop: never wait on our own queue.
            let _ = self.events.try_send(DaemonEvent::Session(SessionSignal::Failed {
                generation: self.generation,
                reason: "discord actor is gone".to_string(),
            }));
        }
    }

    async fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), SendError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(ActorCommand::SetActivity {
                payload: payload.clone(),
                reply,
            })
            .map_err(|_| SendError::SessionGone)?;

        tokio::time::timeout(SEND_TIMEOUT, reply_rx)
            .await
            .map_err(|_| SendError::Rejected("timed out waiting for discord".to_string()))?
            .map_err(|_| SendError::SessionGone)?
    }

    async fn destroy(&mut self) {
        let (done, done_rx) = oneshot::channel();
        if self.tx.send(ActorCommand::Destroy { done }).is_ok() {
            let _ = tokio::time::timeout(DESTROY_TIMEOUT, done_rx).await;
        }
        debug!("discord: gen={} destroyed", self.generation);
    }
}

/// The actor loop: owns the IPC client and processes commands.
fn actor_loop(
    generation: u64,
    rx: std_mpsc::Receiver<ActorCommand>,
    events: mpsc::Sender<DaemonEvent>,
) {
    let mut client: Option<DiscordIpcClient> = None;

    for cmd in rx {
        match cmd {
            ActorCommand::Connect { app_id } => {
                if client.is_some() {
                    debug!("discord: gen={} already connected", generation);
                    continue;
                }

                let mut ipc = DiscordIpcClient::new(app_id.as_str());
                let signal = match ipc.connect() {
                    Ok(()) => {
                        info!("discord: gen={} connected as {}", generation, app_id);
                        client = Some(ipc);
                        SessionSignal::Ready { generation }
                    }
                    Err(e) => SessionSignal::Failed {
                        generation,
                        reason: e.to_string(),
                    },
                };
                if events.blocking_send(DaemonEvent::Session(signal)).is_err() {
                    break;
                }
            }

            ActorCommand::SetActivity { payload, reply } => {
                let Some(ipc) = client.as_mut() else {
                    let _ = reply.send(Err(SendError::NotConnected));
                    continue;
                };

                let activity = activity::Activity::new()
                    .details(payload.details.as_str())
                    .state(payload.state.as_str())
                    .timestamps(activity::Timestamps::new().start(payload.start_timestamp))
                    .assets(
                        activity::Assets::new()
                            .large_image(payload.large_image_key.as_str())
                            .large_text(payload.image_text.as_str())
                            .small_image(payload.small_image_key.as_str())
                            .small_text(payload.small_image_text.as_str()),
                    );

                let result = ipc
                    .set_activity(activity)
                    .map_err(|e| SendError::Rejected(e.to_string()));
                if result.is_err() {
                    // The socket is most likely gone; the core recreates us.
                    if let Some(mut dead) = client.take() {
                        let _ = dead.close();
                    }
                }
                let _ = reply.send(result);
            }

            ActorCommand::Destroy { done } => {
                if let Some(mut ipc) = client.take() {
                    let _ = ipc.clear_activity();
                    let _ = ipc.close();
                }
                let _ = done.send(());
                break;
            }
        }
    }

    debug!("discord: gen={} actor exiting", generation);
}
