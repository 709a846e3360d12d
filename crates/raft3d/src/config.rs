//! Node configuration: an optional `raft3d.toml` plus CLI overrides.
//!
//! ```toml
//! node_id = "node1"
//! bind_host = "0.0.0.0"
//! advertise_host = "10.0.0.1"
//! http_port = 8080
//! raft_port = 12000
//! data_dir = "data"
//! log_filter = "info,raft3d=debug"
//!
//! [raft]
//! heartbeat_interval_ms = 250
//! election_timeout_min_ms = 1000
//! election_timeout_max_ms = 2000
//! snapshot_after_logs = 1024
//! logs_kept_after_snapshot = 1000
//! snapshot_chunk_bytes = 4194304
//! install_snapshot_timeout_ms = 5000
//! commit_timeout_ms = 10000
//! join_timeout_ms = 30000
//! rpc_timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use raft3d_raft::{MAX_RPC_BODY_BYTES, SNAPSHOT_CHUNK_BYTES, snapshot_rpc_body_bound};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_FILTER: &str = "info,raft3d=debug";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: String,
    /// Interface the HTTP and raft listeners bind to.
    pub bind_host: String,
    /// Host other nodes use to reach this one; defaults to `bind_host`.
    pub advertise_host: Option<String>,
    pub http_port: u16,
    pub raft_port: u16,
    pub data_dir: PathBuf,
    /// HTTP address of a running node to join instead of bootstrapping.
    pub join: Option<String>,
    pub log_filter: String,
    pub raft: RaftTuning,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_string(),
            bind_host: "127.0.0.1".to_string(),
            advertise_host: None,
            http_port: 8080,
            raft_port: 12000,
            data_dir: PathBuf::from("data"),
            join: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            raft: RaftTuning::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftTuning {
    pub heartbeat_interval_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    /// Build a snapshot once this many entries were applied since the last one.
    pub snapshot_after_logs: u64,
    /// Already-snapshotted entries kept in the log for lagging followers.
    pub logs_kept_after_snapshot: u64,
    /// Snapshot bytes per install-snapshot RPC.
    pub snapshot_chunk_bytes: u64,
    /// Deadline for sending and installing one snapshot chunk.
    pub install_snapshot_timeout_ms: u64,
    pub commit_timeout_ms: u64,
    pub join_timeout_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for RaftTuning {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 250,
            election_timeout_min_ms: 1000,
            election_timeout_max_ms: 2000,
            snapshot_after_logs: 1024,
            logs_kept_after_snapshot: 1000,
            snapshot_chunk_bytes: SNAPSHOT_CHUNK_BYTES,
            install_snapshot_timeout_ms: 5_000,
            commit_timeout_ms: 10_000,
            join_timeout_ms: 30_000,
            rpc_timeout_ms: 5_000,
        }
    }
}

impl RaftTuning {
    /// Validated openraft configuration.
    pub fn openraft_config(&self) -> anyhow::Result<openraft::Config> {
        let body = snapshot_rpc_body_bound(self.snapshot_chunk_bytes);
        if self.snapshot_chunk_bytes == 0 || body > MAX_RPC_BODY_BYTES as u64 {
            bail!(
                "snapshot_chunk_bytes = {} encodes to up to {body} bytes; raft rpc limit is {MAX_RPC_BODY_BYTES}",
                self.snapshot_chunk_bytes
            );
        }
        let config = openraft::Config {
            cluster_name: "raft3d".to_string(),
            heartbeat_interval: self.heartbeat_interval_ms,
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(self.snapshot_after_logs),
            max_in_snapshot_log_to_keep: self.logs_kept_after_snapshot,
            snapshot_max_chunk_size: self.snapshot_chunk_bytes,
            install_snapshot_timeout: self.install_snapshot_timeout_ms,
            ..Default::default()
        };
        config.validate().context("invalid raft tuning")
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn http_bind(&self) -> String {
        format!("{}:{}", self.bind_host, self.http_port)
    }

    pub fn raft_bind(&self) -> String {
        format!("{}:{}", self.bind_host, self.raft_port)
    }

    pub fn advertise_host(&self) -> &str {
        self.advertise_host.as_deref().unwrap_or(&self.bind_host)
    }

    /// Per-node directory holding `raft.redb`.
    pub fn node_dir(&self) -> PathBuf {
        self.data_dir.join(&self.node_id)
    }

    pub fn db_path(&self) -> PathBuf {
        self.node_dir().join("raft.redb")
    }
}

/// raft3d node command line. Flags override the config file.
#[derive(Debug, Default, Parser)]
#[command(name = "raft3d", about = "Replicated 3D-printer fleet store", version)]
pub struct Cli {
    /// TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Node name [default: node1].
    #[arg(long)]
    pub node_id: Option<String>,

    /// HTTP API port [default: 8080].
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Raft RPC port [default: 12000].
    #[arg(long)]
    pub raft_port: Option<u16>,

    /// HTTP address of an existing node to join.
    #[arg(long)]
    pub join: Option<String>,

    /// Root data directory [default: data].
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Listen host [default: 127.0.0.1].
    #[arg(long)]
    pub bind_host: Option<String>,

    /// Host advertised to peers [default: bind host].
    #[arg(long)]
    pub advertise_host: Option<String>,
}

impl Cli {
    /// Load the config file, if any, and apply flag overrides.
    pub fn into_config(self) -> anyhow::Result<NodeConfig> {
        let base = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };
        Ok(self.apply(base))
    }

    pub fn apply(self, mut config: NodeConfig) -> NodeConfig {
        if let Some(v) = self.node_id {
            config.node_id = v;
        }
        if let Some(v) = self.http_port {
            config.http_port = v;
        }
        if let Some(v) = self.raft_port {
            config.raft_port = v;
        }
        if let Some(v) = self.join {
            config.join = Some(v);
        }
        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.bind_host {
            config.bind_host = v;
        }
        if let Some(v) = self.advertise_host {
            config.advertise_host = Some(v);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_cli_contract() {
        let config = NodeConfig::default();
        assert_eq!(config.node_id, "node1");
        assert_eq!(config.http_bind(), "127.0.0.1:8080");
        assert_eq!(config.raft_bind(), "127.0.0.1:12000");
        assert_eq!(config.db_path(), PathBuf::from("data/node1/raft.redb"));
        assert!(config.join.is_none());
        assert_eq!(config.raft.commit_timeout(), Duration::from_secs(10));
        assert_eq!(config.raft.join_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            node_id = "node2"
            http_port = 8081

            [raft]
            heartbeat_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.node_id, "node2");
        assert_eq!(config.http_port, 8081);
        assert_eq!(config.raft_port, 12000);
        assert_eq!(config.raft.heartbeat_interval_ms, 100);
        assert_eq!(config.raft.election_timeout_min_ms, 1000);
    }

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from([
            "raft3d",
            "--node-id",
            "node3",
            "--raft-port",
            "12002",
            "--join",
            "127.0.0.1:8080",
            "--advertise-host",
            "10.0.0.3",
        ]);
        let base = NodeConfig {
            http_port: 9000,
            ..NodeConfig::default()
        };
        let config = cli.apply(base);

        assert_eq!(config.node_id, "node3");
        assert_eq!(config.raft_port, 12002);
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.join.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(config.advertise_host(), "10.0.0.3");
    }

    #[test]
    fn default_tuning_is_valid() {
        let config = RaftTuning::default().openraft_config().unwrap();
        assert_eq!(config.heartbeat_interval, 250);
        assert_eq!(config.election_timeout_min, 1000);
    }

    #[test]
    fn snapshot_transfer_settings_reach_openraft() {
        let config = RaftTuning::default().openraft_config().unwrap();
        assert_eq!(config.snapshot_max_chunk_size, SNAPSHOT_CHUNK_BYTES);
        assert_eq!(config.install_snapshot_timeout, 5_000);
        assert_eq!(config.max_in_snapshot_log_to_keep, 1000);
        assert!(
            snapshot_rpc_body_bound(config.snapshot_max_chunk_size) <= MAX_RPC_BODY_BYTES as u64
        );
    }

    #[test]
    fn oversized_snapshot_chunk_is_rejected() {
        let tuning = RaftTuning {
            snapshot_chunk_bytes: MAX_RPC_BODY_BYTES as u64,
            ..RaftTuning::default()
        };
        let err = tuning.openraft_config().unwrap_err();
        assert!(err.to_string().contains("snapshot_chunk_bytes"));

        let zero = RaftTuning {
            snapshot_chunk_bytes: 0,
            ..RaftTuning::default()
        };
        assert!(zero.openraft_config().is_err());
    }

    #[test]
    fn inverted_election_window_is_rejected() {
        let tuning = RaftTuning {
            election_timeout_min_ms: 2000,
            election_timeout_max_ms: 1000,
            ..RaftTuning::default()
        };
        assert!(tuning.openraft_config().is_err());
    }

    #[test]
    fn config_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft3d.toml");
        let config = NodeConfig {
            node_id: "node9".to_string(),
            join: Some("127.0.0.1:8080".to_string()),
            ..NodeConfig::default()
        };
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(NodeConfig::from_file(&path).unwrap(), config);
    }
}
