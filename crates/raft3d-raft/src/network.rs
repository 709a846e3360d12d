//! Raft network layer over HTTP/1 + JSON.
//!
//! Implements `RaftNetworkFactory` and `RaftNetwork` so openraft can
//! talk to peers. Each RPC is the openraft request serialized as JSON and
//! POSTed to the peer's raft listener; the reply is a JSON `Result` whose
//! `Err` arm carries the remote `RaftError`.

use std::time::Duration;

use openraft::BasicNode;
use openraft::error::{InstallSnapshotError, RPCError, RaftError, RemoteError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::http::HttpChannel;
use crate::typ::TypeConfig;

pub const APPEND_PATH: &str = "/raft/append";
pub const VOTE_PATH: &str = "/raft/vote";
pub const SNAPSHOT_PATH: &str = "/raft/snapshot";

/// Upper bound on a single RPC when openraft does not supply a tighter one.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory that creates per-peer HTTP connections.
pub struct NetworkFactory {
    timeout: Duration,
}

impl NetworkFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NetworkFactory {
    fn default() -> Self {
        Self::new(DEFAULT_RPC_TIMEOUT)
    }
}

/// A single peer connection.
pub struct NetworkConnection {
    target: u64,
    channel: HttpChannel,
    timeout: Duration,
}

type RpcResult<Resp, E> = Result<Resp, RPCError<u64, BasicNode, E>>;

impl NetworkConnection {
    fn mk_unreachable<E: std::error::Error>(
        target: u64,
        addr: &str,
        msg: &str,
    ) -> RPCError<u64, BasicNode, E> {
        RPCError::Unreachable(Unreachable::new(&std::io::Error::other(format!(
            "raft rpc to node {target} ({addr}): {msg}",
        ))))
    }

    async fn call<Req, Resp, E>(
        &mut self,
        path: &str,
        rpc: &Req,
        option: &RPCOption,
    ) -> RpcResult<Resp, E>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        E: std::error::Error + DeserializeOwned,
    {
        let target = self.target;
        let addr = self.channel.addr().to_string();
        let timeout = option.hard_ttl().min(self.timeout);

        let body = serde_json::to_vec(rpc)
            .map_err(|e| Self::mk_unreachable::<E>(target, &addr, &format!("serialize: {e}")))?;

        let (status, bytes) = self
            .channel
            .post_json(path, body, timeout)
            .await
            .map_err(|e| {
                debug!(target_node = target, %addr, error = %e, "raft rpc failed");
                Self::mk_unreachable::<E>(target, &addr, &e.to_string())
            })?;

        if !status.is_success() {
            warn!(target_node = target, %addr, %status, path, "raft rpc rejected");
            return Err(Self::mk_unreachable::<E>(
                target,
                &addr,
                &format!("http status {status}"),
            ));
        }

        let reply: Result<Resp, E> = serde_json::from_slice(&bytes).map_err(|e| {
            Self::mk_unreachable::<E>(target, &addr, &format!("deserialize response: {e}"))
        })?;

        reply.map_err(|e| RPCError::RemoteError(RemoteError::new(target, e)))
    }
}

impl RaftNetworkFactory<TypeConfig> for NetworkFactory {
    type Network = NetworkConnection;

    async fn new_client(&mut self, target: u64, node: &BasicNode) -> Self::Network {
        debug!(target, addr = %node.addr, "creating raft network connection");
        NetworkConnection {
            target,
            channel: HttpChannel::new(node.addr.clone()),
            timeout: self.timeout,
        }
    }
}

impl RaftNetwork<TypeConfig> for NetworkConnection {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        option: RPCOption,
    ) -> RpcResult<AppendEntriesResponse<u64>, RaftError<u64>> {
        self.call(APPEND_PATH, &rpc, &option).await
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        option: RPCOption,
    ) -> RpcResult<InstallSnapshotResponse<u64>, RaftError<u64, InstallSnapshotError>> {
        self.call(SNAPSHOT_PATH, &rpc, &option).await
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<u64>,
        option: RPCOption,
    ) -> RpcResult<VoteResponse<u64>, RaftError<u64>> {
        self.call(VOTE_PATH, &rpc, &option).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::routing::post;
    use openraft::Vote;

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn vote_request() -> VoteRequest<u64> {
        VoteRequest {
            vote: Vote::new(2, 7),
            last_log_id: None,
        }
    }

    fn option() -> RPCOption {
        RPCOption::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn factory_creates_lazy_connection() {
        let mut factory = NetworkFactory::default();
        let node = BasicNode::new("127.0.0.1:12000");
        let conn = factory.new_client(1, &node).await;
        assert_eq!(conn.target, 1);
        assert_eq!(conn.channel.addr(), "127.0.0.1:12000");
        assert!(!conn.channel.is_connected());
    }

    #[tokio::test]
    async fn vote_reply_is_decoded() {
        let app = axum::Router::new().route(
            VOTE_PATH,
            post(|Json(req): Json<VoteRequest<u64>>| async move {
                let resp = VoteResponse::<u64> {
                    vote: req.vote,
                    vote_granted: true,
                    last_log_id: None,
                };
                Json(Ok::<_, RaftError<u64>>(resp))
            }),
        );
        let addr = serve(app).await;

        let mut factory = NetworkFactory::default();
        let mut conn = factory.new_client(7, &BasicNode::new(addr)).await;
        let resp = conn.vote(vote_request(), option()).await.unwrap();
        assert!(resp.vote_granted);
        assert_eq!(resp.vote, Vote::new(2, 7));
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let app = axum::Router::new().route(
            VOTE_PATH,
            post(|| async {
                Json(Err::<VoteResponse<u64>, _>(RaftError::<u64>::Fatal(
                    openraft::error::Fatal::Stopped,
                )))
            }),
        );
        let addr = serve(app).await;

        let mut factory = NetworkFactory::default();
        let mut conn = factory.new_client(3, &BasicNode::new(addr)).await;
        let err = conn.vote(vote_request(), option()).await.unwrap_err();
        assert!(matches!(err, RPCError::RemoteError(_)), "got {err}");
    }

    #[tokio::test]
    async fn error_status_is_unreachable() {
        let app = axum::Router::new();
        let addr = serve(app).await;

        let mut factory = NetworkFactory::default();
        let mut conn = factory.new_client(3, &BasicNode::new(addr)).await;
        let err = conn.vote(vote_request(), option()).await.unwrap_err();
        assert!(matches!(err, RPCError::Unreachable(_)), "got {err}");
    }

    #[tokio::test]
    async fn dead_peer_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut factory = NetworkFactory::default();
        let mut conn = factory.new_client(9, &BasicNode::new(addr)).await;
        let err = conn.vote(vote_request(), option()).await.unwrap_err();
        assert!(matches!(err, RPCError::Unreachable(_)));
    }
}
