//! Runtime configuration: the single `clap::Parser` struct every other
//! component is bootstrapped from (§6A). No other module reads environment
//! variables directly — flags accept `env` fallbacks via clap's `env`
//! feature so container deployments can configure either way.

use std::time::Duration;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lower")]
pub enum AlertStoreType {
    Local,
    Replicated,
}

#[derive(Debug, Parser)]
#[command(name = "openfero", about = "Self-healing controller for a container orchestrator")]
pub struct Config {
    /// Namespace the descriptor cache and API reads are scoped to display;
    /// RemediationDescriptor itself is cluster-scoped, but this bounds the
    /// label-selector default used when listing.
    #[arg(long, env = "OPENFERO_DESCRIPTOR_NAMESPACE", default_value = "openfero")]
    pub descriptor_namespace: String,

    /// Namespace remediation jobs are created in.
    #[arg(long, env = "OPENFERO_JOB_DESTINATION_NAMESPACE", default_value = "openfero")]
    pub job_destination_namespace: String,

    /// Label selector applied when watching dispatched jobs.
    #[arg(long, env = "OPENFERO_LABEL_SELECTOR")]
    pub label_selector: Option<String>,

    /// Alert Store backend.
    #[arg(long, value_enum, env = "OPENFERO_ALERT_STORE_TYPE", default_value = "local")]
    pub alert_store_type: AlertStoreType,

    /// Alert Store capacity (entries retained before eviction).
    #[arg(long, env = "OPENFERO_ALERT_STORE_SIZE", default_value_t = alert_store::local::DEFAULT_CAPACITY)]
    pub alert_store_size: usize,

    /// Number of concurrent dispatch workers draining the job-creation queue.
    #[arg(long, env = "OPENFERO_WORKER_POOL_SIZE", default_value_t = 8)]
    pub worker_pool_size: usize,

    /// Per-call orchestrator API read timeout, in seconds.
    #[arg(long = "read-timeout", env = "OPENFERO_READ_TIMEOUT_SECONDS", default_value_t = 10)]
    pub read_timeout_seconds: u64,

    /// Grace period for in-flight work to finish on shutdown, in seconds.
    #[arg(long = "shutdown-grace", env = "OPENFERO_SHUTDOWN_GRACE_SECONDS", default_value_t = 10)]
    pub shutdown_grace_seconds: u64,

    /// Default `ttlSecondsAfterFinished` applied to materialized jobs when the
    /// descriptor's template leaves it unset.
    #[arg(long, env = "OPENFERO_JOB_TTL_SECONDS", default_value_t = 300)]
    pub job_ttl_seconds: i32,

    /// Path to a kubeconfig file; when absent, in-cluster credentials are used.
    #[arg(long, env = "OPENFERO_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Ambient log level/filter, e.g. `info`, `openfero=debug,warn`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Port the webhook/API/SSE HTTP server listens on.
    #[arg(long, env = "OPENFERO_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Port the `/metrics` server listens on.
    #[arg(long, env = "OPENFERO_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Node identity for the replicated Alert Store's gossip cluster.
    /// Required when `--alert-store-type replicated`.
    #[arg(long, env = "OPENFERO_GOSSIP_NODE_ID")]
    pub gossip_node_id: Option<String>,

    /// Gossip cluster id peers must share to converge.
    #[arg(long, env = "OPENFERO_GOSSIP_CLUSTER_ID", default_value = "openfero")]
    pub gossip_cluster_id: String,

    /// UDP address this node listens for gossip on, e.g. `0.0.0.0:7946`.
    #[arg(long, env = "OPENFERO_GOSSIP_LISTEN_ADDR")]
    pub gossip_listen_addr: Option<std::net::SocketAddr>,

    /// Address advertised to peers, if different from the listen address.
    #[arg(long, env = "OPENFERO_GOSSIP_ADVERTISE_ADDR")]
    pub gossip_advertise_addr: Option<std::net::SocketAddr>,

    /// Comma-separated seed peer addresses to join the gossip cluster through.
    #[arg(long, env = "OPENFERO_GOSSIP_SEEDS", value_delimiter = ',')]
    pub gossip_seeds: Vec<String>,
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}
