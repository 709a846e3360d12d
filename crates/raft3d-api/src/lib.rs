//! raft3d-api: REST API for a raft3d node.
//!
//! Every route maps onto one store facade or membership operation.
//! Writes only succeed on the leader; reads are served from the local
//! replica.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/printers` | Create a printer |
//! | GET | `/api/v1/printers` | List printers |
//! | GET | `/api/v1/printers/{id}` | Get a printer |
//! | DELETE | `/api/v1/printers/{id}` | Delete a printer |
//! | POST | `/api/v1/filaments` | Create a filament spool |
//! | GET | `/api/v1/filaments` | List filaments |
//! | GET | `/api/v1/filaments/{id}` | Get a filament |
//! | POST | `/api/v1/print_jobs` | Submit a print job |
//! | GET | `/api/v1/print_jobs` | List print jobs |
//! | GET | `/api/v1/print_jobs/{id}` | Get a print job |
//! | POST | `/api/v1/print_jobs/{id}/status` | Change a job's status |
//! | GET | `/health` | Liveness and current leader |
//! | POST | `/join` | Add a node as a voter (leader only) |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use raft3d_cluster::ClusterMembership;
use raft3d_raft::ConsensusLog;
use raft3d_store::Store;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub membership: ClusterMembership,
    pub log: Arc<dyn ConsensusLog>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/printers",
            get(handlers::list_printers).post(handlers::create_printer),
        )
        .route(
            "/printers/{id}",
            get(handlers::get_printer).delete(handlers::delete_printer),
        )
        .route(
            "/filaments",
            get(handlers::list_filaments).post(handlers::create_filament),
        )
        .route("/filaments/{id}", get(handlers::get_filament))
        .route(
            "/print_jobs",
            get(handlers::list_jobs).post(handlers::create_job),
        )
        .route("/print_jobs/{id}", get(handlers::get_job))
        .route("/print_jobs/{id}/status", post(handlers::update_job_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health))
        .route("/join", post(handlers::join))
        .with_state(state)
}
