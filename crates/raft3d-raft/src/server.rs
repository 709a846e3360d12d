//! Raft RPC server: the peer-facing side of the HTTP transport.
//!
//! Each route deserializes the openraft request, hands it to the local
//! Raft instance and replies with the JSON-encoded `Result`. A body that
//! fails to parse is rejected by axum with a 4xx before reaching Raft.
//!
//! Snapshot chunks are `Vec<u8>` and serde_json writes them as arrays of
//! numbers, up to four bytes of JSON per byte of snapshot. The body limit
//! is raised from axum's 2 MB default accordingly.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::post;
use axum::{Json, Router};
use openraft::error::{InstallSnapshotError, RaftError};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use tracing::debug;

use crate::network::{APPEND_PATH, SNAPSHOT_PATH, VOTE_PATH};
use crate::typ::{Raft3dRaft, TypeConfig};

/// Largest request body the raft routes accept.
pub const MAX_RPC_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Default snapshot chunk size handed to openraft.
pub const SNAPSHOT_CHUNK_BYTES: u64 = 4 * 1024 * 1024;

/// Room for the vote and snapshot meta around the chunk data.
const SNAPSHOT_ENVELOPE_BYTES: u64 = 64 * 1024;

/// Worst-case JSON body size of an install-snapshot RPC carrying `chunk` bytes.
pub fn snapshot_rpc_body_bound(chunk: u64) -> u64 {
    chunk.saturating_mul(4).saturating_add(SNAPSHOT_ENVELOPE_BYTES)
}

/// Build the router serving inter-node Raft RPCs.
pub fn raft_router(raft: Arc<Raft3dRaft>) -> Router {
    Router::new()
        .route(APPEND_PATH, post(append_entries))
        .route(VOTE_PATH, post(vote))
        .route(SNAPSHOT_PATH, post(install_snapshot))
        .layer(DefaultBodyLimit::max(MAX_RPC_BODY_BYTES))
        .with_state(raft)
}

async fn append_entries(
    State(raft): State<Arc<Raft3dRaft>>,
    Json(req): Json<AppendEntriesRequest<TypeConfig>>,
) -> Json<Result<AppendEntriesResponse<u64>, RaftError<u64>>> {
    debug!(
        term = req.vote.leader_id().term,
        entries = req.entries.len(),
        "handling append_entries rpc"
    );
    Json(raft.append_entries(req).await)
}

async fn vote(
    State(raft): State<Arc<Raft3dRaft>>,
    Json(req): Json<VoteRequest<u64>>,
) -> Json<Result<VoteResponse<u64>, RaftError<u64>>> {
    debug!(term = req.vote.leader_id().term, "handling vote rpc");
    Json(raft.vote(req).await)
}

async fn install_snapshot(
    State(raft): State<Arc<Raft3dRaft>>,
    Json(req): Json<InstallSnapshotRequest<TypeConfig>>,
) -> Json<Result<InstallSnapshotResponse<u64>, RaftError<u64, InstallSnapshotError>>> {
    debug!(
        snapshot_id = %req.meta.snapshot_id,
        offset = req.offset,
        done = req.done,
        "handling install_snapshot rpc"
    );
    Json(raft.install_snapshot(req).await)
}
