use crate::core::DaemonEvent;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use presence_proto::protocol::StatusSnapshot;
use presence_proto::state::StatusBoard;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    board: StatusBoard,
    event_tx: mpsc::Sender<DaemonEvent>,
}

fn router(board: StatusBoard, event_tx: mpsc::Sender<DaemonEvent>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/refresh", get(refresh).post(refresh))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { board, event_tx })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    board: StatusBoard,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(board, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_status(State(state): State<HttpState>) -> Json<StatusSnapshot> {
    Json(state.board.get().await)
}

async fn refresh(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Refresh");
    if state.event_tx.send(DaemonEvent::Refresh).await.is_err() {
        error!("Failed to send refresh request");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_proto::protocol::{Profile, SessionStatus};

    async fn serve(board: StatusBoard, event_tx: mpsc::Sender<DaemonEvent>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(board, event_tx)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_status_and_refresh() {
        let board = StatusBoard::new();
        board
            .publish(StatusSnapshot {
                session: SessionStatus::Connected {
                    profile: Profile::Station,
                },
                active_profile: Profile::Station,
                sends: 4,
                ..Default::default()
            })
            .await;
        let (tx, mut rx) = mpsc::channel(4);
        let base = serve(board, tx).await;
        let client = reqwest::Client::new();

        let status: serde_json::Value = client
            .get(format!("{}/api/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["session"]["state"], "connected");
        assert_eq!(status["session"]["profile"], "Station");
        assert_eq!(status["sends"], 4);

        let res = client
            .post(format!("{}/api/refresh", base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
        assert!(matches!(rx.recv().await, Some(DaemonEvent::Refresh)));
    }

    #[tokio::test]
    async fn test_refresh_after_core_exit() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let base = serve(StatusBoard::new(), tx).await;

        let res = reqwest::get(format!("{}/api/refresh", base)).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
