//! Join client used by a starting follower.

use std::time::Duration;

use raft3d_raft::TransportError;
use raft3d_raft::http::post_json;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::membership::{JoinRequest, JoinResponse};

pub const JOIN_PATH: &str = "/join";

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("encode join request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("join rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed join response: {0}")]
    Malformed(String),
}

#[derive(Deserialize)]
struct Reply {
    data: Option<JoinResponse>,
}

/// Ask the leader at `leader_http` to add this node as a voter.
pub async fn join_cluster(
    leader_http: &str,
    req: &JoinRequest,
    timeout: Duration,
) -> Result<JoinResponse, JoinError> {
    let body = serde_json::to_vec(req)?;
    let (status, bytes) = post_json(leader_http, JOIN_PATH, body, timeout).await?;

    if !status.is_success() {
        return Err(JoinError::Rejected {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    let reply: Reply =
        serde_json::from_slice(&bytes).map_err(|e| JoinError::Malformed(e.to_string()))?;
    let joined = reply
        .data
        .ok_or_else(|| JoinError::Malformed("missing data".to_string()))?;

    info!(
        leader = %leader_http,
        node_id = %joined.node_id,
        raft_id = joined.raft_id,
        "joined cluster"
    );
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::json;

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn request() -> JoinRequest {
        JoinRequest {
            node_id: "node2".to_string(),
            raft_address: "127.0.0.1:12001".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_join_returns_assigned_id() {
        let app = axum::Router::new().route(
            JOIN_PATH,
            post(|Json(req): Json<JoinRequest>| async move {
                Json(json!({
                    "success": true,
                    "data": { "node_id": req.node_id, "raft_id": 42 }
                }))
            }),
        );
        let addr = serve(app).await;

        let resp = join_cluster(&addr, &request(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(resp.node_id, "node2");
        assert_eq!(resp.raft_id, 42);
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let app = axum::Router::new().route(
            JOIN_PATH,
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "success": false, "error": "not the leader" })),
                )
            }),
        );
        let addr = serve(app).await;

        let err = join_cluster(&addr, &request(), Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            JoinError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("not the leader"));
            }
            other => panic!("expected Rejected, got {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_leader_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = join_cluster(&addr, &request(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::Transport(_)));
    }
}
