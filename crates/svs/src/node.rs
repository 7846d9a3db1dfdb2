//! An SVS node: store, core and fetch coordinator wired from one config.

use std::sync::Arc;

use bytes::Bytes;
use svs_core::{MissingData, Name, StateVector};
use svs_store::{MemoryStore, SqliteStore, Store};
use svs_sync::{
    CoreState, DataHandler, FetchCoordinator, FetchOptions, FetchResult, SyncCore, Transport,
    TwoStateCore,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::NodeConfig;
use crate::error::Result;

/// A participant in one sync group.
///
/// Opening a node attaches its handlers; [`start`](Self::start) begins
/// periodic announcements.
pub struct SvsNode<T: Transport> {
    config: NodeConfig,
    core: Arc<TwoStateCore<T>>,
    fetcher: FetchCoordinator<T, dyn Store>,
}

impl<T: Transport> SvsNode<T> {
    /// Open a node and attach its sync and data handlers.
    ///
    /// Fetch results go to `handler` in completion order.
    pub async fn open(
        transport: Arc<T>,
        config: NodeConfig,
        handler: Arc<dyn DataHandler>,
    ) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn Store> = match &config.storage_path {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        let naming = config.data_naming();
        let core = Arc::new(TwoStateCore::new(
            Arc::clone(&transport),
            naming.sync_prefix(),
            &config.source,
            config.sync.clone(),
        )?);

        let mut options = FetchOptions::new(config.source.clone(), naming);
        options.handling = config.handling;
        options.cache_others = config.cache_others;

        let fetcher = FetchCoordinator::new(
            transport,
            store,
            Arc::clone(&core) as Arc<dyn SyncCore>,
            config.sync.clone(),
            options,
            handler,
        )?;
        fetcher.listen().await?;

        info!(source = %config.source, group = %config.group, "node opened");
        Ok(Self {
            config,
            core,
            fetcher,
        })
    }

    /// [`open`](Self::open) with results delivered to a channel.
    pub async fn open_with_channel(
        transport: Arc<T>,
        config: NodeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FetchResult>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Self::open(transport, config, Arc::new(tx)).await?;
        Ok((node, rx))
    }

    /// Begin periodic announcements, sending one now if `fire_now`.
    pub fn start(&self, fire_now: bool) {
        self.fetcher.activate(fire_now);
    }

    /// Publish `content` as the next sequence number of this node's source.
    pub async fn publish(&self, content: impl Into<Bytes>) -> Result<u64> {
        Ok(self.fetcher.publish_data(content).await?)
    }

    /// Fetch one packet explicitly. Needed with manual handling.
    pub async fn need_data(&self, source: &Name, seq: u64) {
        self.fetcher.need_data(source, seq).await;
    }

    /// Missing ranges as they are discovered.
    pub fn subscribe(&self) -> mpsc::Receiver<Vec<MissingData>> {
        self.core.subscribe()
    }

    pub fn source(&self) -> &Name {
        &self.config.source
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// This node's own latest sequence number.
    pub fn seq(&self) -> u64 {
        self.core.seq(&self.config.source)
    }

    /// Latest known sequence number for any source.
    pub fn seq_of(&self, source: &Name) -> u64 {
        self.core.seq(source)
    }

    pub fn state_vector(&self) -> StateVector {
        self.core.state_vector()
    }

    pub fn state(&self) -> CoreState {
        self.core.state()
    }

    pub fn in_flight(&self) -> usize {
        self.fetcher.in_flight()
    }

    pub fn queued(&self) -> usize {
        self.fetcher.queued()
    }

    /// Stop everything and close the store. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.fetcher.shutdown().await;
        info!(source = %self.config.source, "node shut down");
    }
}
