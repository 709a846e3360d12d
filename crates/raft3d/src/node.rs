//! Assembling and running one raft3d node.
//!
//! 1. Opens `<data-dir>/<node-id>/raft.redb` for the log, snapshots and node map
//! 2. Restores the state machine from its last snapshot
//! 3. Serves raft RPCs on the raft port and the REST API on the HTTP port
//! 4. Bootstraps a single-voter cluster, or asks an existing node to add it

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::Router;
use openraft::BasicNode;
use raft3d_api::ApiState;
use raft3d_cluster::{ClusterMembership, JoinRequest, join_cluster};
use raft3d_raft::{
    ConsensusLog, LogStore, NetworkFactory, NodeIdMap, Raft3dRaft, RaftLog, StateMachine,
    raft_router,
};
use raft3d_store::Store;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::NodeConfig;

/// A started node. Dropping it does not stop the servers; call `shutdown`.
pub struct RunningNode {
    pub raft_id: u64,
    pub raft: Arc<Raft3dRaft>,
    pub log: Arc<RaftLog>,
    pub store: Store,
    pub http_addr: SocketAddr,
    pub raft_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    servers: Vec<JoinHandle<()>>,
}

/// Start a node from `config` and return once it has bootstrapped or joined.
pub async fn start(config: NodeConfig) -> anyhow::Result<RunningNode> {
    info!(node_id = %config.node_id, "raft3d node starting");

    // ── Storage ──────────────────────────────────────────────────
    let node_dir = config.node_dir();
    std::fs::create_dir_all(&node_dir)
        .with_context(|| format!("create data dir {}", node_dir.display()))?;
    let db_path = config.db_path();
    let db = Arc::new(
        redb::Database::create(&db_path)
            .with_context(|| format!("open raft db {}", db_path.display()))?,
    );
    info!(path = ?db_path, "raft storage opened");

    let node_map = Arc::new(NodeIdMap::new(Arc::clone(&db))?);
    let raft_id = node_map.get_or_insert(&config.node_id)?;
    info!(node_id = %config.node_id, raft_id, "node id mapped");

    let log_store = LogStore::new(Arc::clone(&db))?;
    // A corrupt snapshot aborts startup here.
    let state_machine = StateMachine::open(db).context("restore state machine")?;
    let reader = state_machine.reader();

    // ── Listeners ────────────────────────────────────────────────
    let raft_listener = TcpListener::bind(config.raft_bind())
        .await
        .with_context(|| format!("bind raft port {}", config.raft_bind()))?;
    let http_listener = TcpListener::bind(config.http_bind())
        .await
        .with_context(|| format!("bind http port {}", config.http_bind()))?;
    let raft_addr = raft_listener.local_addr()?;
    let http_addr = http_listener.local_addr()?;
    let advertised_raft = format!("{}:{}", config.advertise_host(), raft_addr.port());

    // ── Raft ─────────────────────────────────────────────────────
    let raft_config = Arc::new(config.raft.openraft_config()?);
    let network = NetworkFactory::new(config.raft.rpc_timeout());
    let raft = Raft3dRaft::new(raft_id, raft_config, network, log_store, state_machine)
        .await
        .context("create raft instance")?;
    let raft = Arc::new(raft);
    info!(raft_id, raft_addr = %advertised_raft, "raft instance created");

    let log = Arc::new(RaftLog::new(Arc::clone(&raft)));
    let dyn_log: Arc<dyn ConsensusLog> = log.clone();
    let store = Store::new(Arc::clone(&dyn_log), reader)
        .with_commit_timeout(config.raft.commit_timeout());
    let membership = ClusterMembership::new(Arc::clone(&dyn_log), node_map)
        .with_join_timeout(config.raft.join_timeout());

    // ── Servers ──────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let api_router = raft3d_api::build_router(ApiState {
        store: store.clone(),
        membership,
        log: dyn_log,
    });
    let raft_server = spawn_server(
        "raft",
        raft_listener,
        raft_router(Arc::clone(&raft)),
        shutdown_rx.clone(),
    );
    let http_server = spawn_server("http", http_listener, api_router, shutdown_rx);
    let servers = vec![raft_server, http_server];
    info!(%raft_addr, %http_addr, "servers listening");

    let node = RunningNode {
        raft_id,
        raft,
        log,
        store,
        http_addr,
        raft_addr,
        shutdown_tx,
        servers,
    };

    // ── Bootstrap or join ────────────────────────────────────────
    match &config.join {
        None => {
            let members = BTreeMap::from([(raft_id, BasicNode::new(advertised_raft))]);
            if let Err(e) = node.raft.initialize(members).await {
                // Already initialized: expected on restart.
                info!(error = %e, "raft initialize skipped");
            }
        }
        Some(leader_http) => {
            let req = JoinRequest {
                node_id: config.node_id.clone(),
                raft_address: advertised_raft,
            };
            let joined = match join_cluster(leader_http, &req, config.raft.join_timeout()).await {
                Ok(joined) => joined,
                Err(e) => {
                    node.shutdown().await;
                    return Err(e).with_context(|| format!("join cluster via {leader_http}"));
                }
            };
            if joined.raft_id != raft_id {
                node.shutdown().await;
                bail!(
                    "leader mapped {} to raft id {}, expected {raft_id}",
                    joined.node_id,
                    joined.raft_id
                );
            }
        }
    }

    info!(node_id = %config.node_id, raft_id, "raft3d node ready");
    Ok(node)
}

fn spawn_server(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            error!(server = name, error = %e, "server error");
        }
    })
}

impl RunningNode {
    /// Stop serving, then stop raft.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.servers {
            let _ = handle.await;
        }
        if let Err(e) = self.raft.shutdown().await {
            error!(error = %e, "raft shutdown failed");
        }
        info!(raft_id = self.raft_id, "raft3d node stopped");
    }
}
