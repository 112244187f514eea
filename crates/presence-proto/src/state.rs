use crate::protocol::StatusSnapshot;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Last published daemon status.  The core is the only writer; the HTTP API
/// only reads.
#[derive(Clone, Default)]
pub struct StatusBoard {
    state: Arc<RwLock<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> StatusSnapshot {
        self.state.read().await.clone()
    }

    pub async fn publish(&self, snapshot: StatusSnapshot) {
        *self.state.write().await = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Profile, SessionStatus};

    #[tokio::test]
    async fn test_publish_is_visible_to_clones() {
        let board = StatusBoard::new();
        let reader = board.clone();
        assert_eq!(reader.get().await.session, SessionStatus::Disconnected);

        board
            .publish(StatusSnapshot {
                session: SessionStatus::Connected {
                    profile: Profile::Local,
                },
                ticks: 3,
                ..Default::default()
            })
            .await;

        let seen = reader.get().await;
        assert_eq!(seen.ticks, 3);
        assert_eq!(
            seen.session,
            SessionStatus::Connected {
                profile: Profile::Local
            }
        );
    }
}
