//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Once};
use std::time::Duration;

use svs::{FetchResult, MemoryNetwork, MemoryTransport, Name, NodeConfig, SvsNode, SyncConfig};
use tokio::sync::mpsc;

/// Parse a name, panicking on bad input.
pub fn name(s: &str) -> Name {
    match s.parse() {
        Ok(name) => name,
        Err(e) => panic!("invalid test name {s:?}: {e}"),
    }
}

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Sync settings with short intervals and a seeded RNG.
pub fn fast_sync_config(seed: u64) -> SyncConfig {
    SyncConfig {
        sync_interval: Duration::from_secs(1),
        brief_interval: Duration::from_millis(50),
        rng_seed: Some(seed),
        ..SyncConfig::default()
    }
}

/// A sync group on a private in-memory network.
pub struct TestGroup {
    pub network: Arc<MemoryNetwork>,
    pub group: Name,
    joined: std::sync::atomic::AtomicU64,
}

impl TestGroup {
    pub fn new(group: &str) -> Self {
        Self {
            network: MemoryNetwork::new(),
            group: name(group),
            joined: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Default node config for `source`, with fast timers.
    ///
    /// Each call gets a distinct RNG seed.
    pub fn config(&self, source: &str) -> NodeConfig {
        let seed = self
            .joined
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut config = NodeConfig::new(name(source), self.group.clone());
        config.sync = fast_sync_config(seed + 1);
        config
    }

    /// Open and start a node with [`config`](Self::config).
    pub async fn join(
        &self,
        source: &str,
    ) -> (SvsNode<MemoryTransport>, mpsc::UnboundedReceiver<FetchResult>) {
        let config = self.config(source);
        self.join_with(config).await
    }

    /// Open and start a node with a caller-supplied config.
    pub async fn join_with(
        &self,
        config: NodeConfig,
    ) -> (SvsNode<MemoryTransport>, mpsc::UnboundedReceiver<FetchResult>) {
        let transport = Arc::new(self.network.create_transport().await);
        let (node, rx) = match SvsNode::open_with_channel(transport, config).await {
            Ok(opened) => opened,
            Err(e) => panic!("failed to open test node: {e}"),
        };
        node.start(false);
        (node, rx)
    }
}
