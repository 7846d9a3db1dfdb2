//! Fetch coordinator: turns missing ranges into data requests.
//!
//! ## Admission
//!
//! At most `max_concurrent_fetches` requests are outstanding (0 lifts the
//! cap). Further work waits in a bounded FIFO queue; `need_data` blocks when
//! the queue is full. Each completed fetch frees a slot and drains one
//! queued item.
//!
//! ## Retries
//!
//! Timeouts and transport errors are retried up to `fetch_retries` times. A
//! nack ends the fetch at once. Either way the data handler always hears
//! about the sequence number, as [`FetchOutcome::Fetched`] or
//! [`FetchOutcome::Unfetchable`].
//!
//! ## Publishing
//!
//! `publish_data` names, signs and stores a packet before telling the core
//! about the new sequence number, so an announced sequence number can
//! always be served.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use svs_core::{AcceptAll, DataPacket, DigestSigner, MissingData, Name, Signer, Verifier};
use svs_store::Store;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{SyncConfig, MAX_PACKET_SIZE};
use crate::core::SyncCore;
use crate::error::{Result, SyncError};
use crate::naming::DataNaming;
use crate::scheduler::lock;
use crate::transport::{NackReason, Request, RequestHandler, RequestOutcome, Transport};

/// Why a sequence number could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unfetchable {
    Nack(NackReason),
    /// Every attempt timed out.
    Timeout,
    /// The last attempt could not be sent.
    Transport(String),
    /// A reply arrived but was not an acceptable packet.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(DataPacket),
    Unfetchable(Unfetchable),
}

/// The final word on one sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub source: Name,
    pub seq: u64,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    /// The fetched packet, if any.
    pub fn packet(&self) -> Option<&DataPacket> {
        match &self.outcome {
            FetchOutcome::Fetched(packet) => Some(packet),
            FetchOutcome::Unfetchable(_) => None,
        }
    }
}

/// Receives fetch results in completion order.
#[async_trait]
pub trait DataHandler: Send + Sync + 'static {
    async fn on_data(&self, result: FetchResult);
}

#[async_trait]
impl DataHandler for mpsc::UnboundedSender<FetchResult> {
    async fn on_data(&self, result: FetchResult) {
        if self.send(result).is_err() {
            trace!("data receiver dropped");
        }
    }
}

/// How missing ranges are expanded into fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlingPolicy {
    /// Every sequence number of one range before the next range.
    #[default]
    SourceCentric,
    /// One sequence number from each range per pass.
    EqualTraffic,
    /// Nothing is fetched automatically; the application calls `need_data`.
    Manual,
}

impl HandlingPolicy {
    /// Lazily expand a batch into `(source, seq)` pairs.
    pub fn plan(self, batch: Vec<MissingData>) -> Box<dyn Iterator<Item = (Name, u64)> + Send> {
        match self {
            Self::SourceCentric => Box::new(batch.into_iter().flat_map(|m| {
                let source = m.source;
                (m.low_seq..=m.high_seq).map(move |seq| (source.clone(), seq))
            })),
            Self::EqualTraffic => Box::new(RoundRobin {
                ranges: batch
                    .into_iter()
                    .filter(|m| m.low_seq <= m.high_seq)
                    .map(|m| (m.source, m.low_seq, m.high_seq))
                    .collect(),
                cursor: 0,
            }),
            Self::Manual => Box::new(std::iter::empty()),
        }
    }
}

struct RoundRobin {
    /// `(source, next, high)`; exhausted ranges are removed.
    ranges: Vec<(Name, u64, u64)>,
    cursor: usize,
}

impl Iterator for RoundRobin {
    type Item = (Name, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.ranges.is_empty() {
            return None;
        }
        if self.cursor >= self.ranges.len() {
            self.cursor = 0;
        }
        let (source, next, high) = &mut self.ranges[self.cursor];
        let item = (source.clone(), *next);
        if *next == *high {
            self.ranges.remove(self.cursor);
        } else {
            *next += 1;
            self.cursor += 1;
        }
        Some(item)
    }
}

/// Node-specific parameters of a [`FetchCoordinator`].
pub struct FetchOptions {
    /// The source this node publishes as.
    pub source: Name,
    pub naming: DataNaming,
    pub handling: HandlingPolicy,
    /// Store packets fetched from other sources.
    pub cache_others: bool,
    pub signer: Arc<dyn Signer>,
    pub verifier: Arc<dyn Verifier>,
}

impl FetchOptions {
    /// Source-centric handling, no caching, digest signatures, no verification.
    pub fn new(source: Name, naming: DataNaming) -> Self {
        Self {
            source,
            naming,
            handling: HandlingPolicy::default(),
            cache_others: false,
            signer: Arc::new(DigestSigner),
            verifier: Arc::new(AcceptAll),
        }
    }
}

#[derive(Debug)]
struct FetchItem {
    source: Name,
    seq: u64,
    retries: u32,
    cache: bool,
}

/// Bounded, retrying fetch pipeline plus the publishing side of a node.
pub struct FetchCoordinator<T: Transport, S: Store + ?Sized> {
    inner: Arc<FetchInner<T, S>>,
}

struct FetchInner<T: Transport, S: Store + ?Sized> {
    transport: Arc<T>,
    store: Arc<S>,
    core: Arc<dyn SyncCore>,
    config: SyncConfig,
    options: FetchOptions,
    handler: Arc<dyn DataHandler>,
    in_flight: Mutex<usize>,
    queue_tx: mpsc::Sender<FetchItem>,
    queue_rx: Mutex<mpsc::Receiver<FetchItem>>,
    publish_lock: tokio::sync::Mutex<()>,
    /// `false` once shut down. Deliveries hold the read side.
    delivery: RwLock<bool>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    relay: Mutex<Option<JoinHandle<()>>>,
    serving: Mutex<Option<Name>>,
}

impl<T: Transport, S: Store + ?Sized + 'static> FetchCoordinator<T, S> {
    /// Create a coordinator and, unless handling is manual, start relaying
    /// the core's missing ranges into fetches.
    ///
    /// `options.source` is claimed on the core so publications can advance it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transport: Arc<T>,
        store: Arc<S>,
        core: Arc<dyn SyncCore>,
        config: SyncConfig,
        options: FetchOptions,
        handler: Arc<dyn DataHandler>,
    ) -> Result<Self> {
        config.validate()?;

        let (queue_tx, queue_rx) = mpsc::channel(config.fetch_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handling = options.handling;
        core.claim_source(&options.source);
        let updates = (handling != HandlingPolicy::Manual).then(|| core.subscribe());

        let inner = Arc::new(FetchInner {
            transport,
            store,
            core,
            config,
            options,
            handler,
            in_flight: Mutex::new(0),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            publish_lock: tokio::sync::Mutex::new(()),
            delivery: RwLock::new(true),
            closed: AtomicBool::new(false),
            shutdown_tx,
            relay: Mutex::new(None),
            serving: Mutex::new(None),
        });

        if let Some(updates) = updates {
            let relay = tokio::spawn(relay(
                Arc::downgrade(&inner),
                updates,
                shutdown_rx,
                handling,
            ));
            *lock(&inner.relay) = Some(relay);
        }

        Ok(Self { inner })
    }

    pub fn core(&self) -> &Arc<dyn SyncCore> {
        &self.inner.core
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn naming(&self) -> &DataNaming {
        &self.inner.options.naming
    }

    /// Attach the data handler, then the core's sync handler.
    pub async fn listen(&self) -> Result<()> {
        let inner = &self.inner;
        let prefix = inner.options.naming.serving_prefix(&inner.options.source);
        let server = Arc::new(DataServer {
            store: Arc::clone(&inner.store),
        });
        inner.transport.attach_handler(&prefix, server).await?;
        inner.transport.register_route(&prefix).await?;
        info!(prefix = %prefix, "data handler attached");
        *lock(&inner.serving) = Some(prefix);
        inner.core.listen().await
    }

    pub fn activate(&self, fire_now: bool) {
        self.inner.core.activate(fire_now);
    }

    /// Fetch `source`'s packet `seq`, caching it if configured to.
    pub async fn need_data(&self, source: &Name, seq: u64) {
        let cache = self.inner.options.cache_others;
        self.inner.need_data(source.clone(), seq, cache).await;
    }

    /// Publish `content` as this node's next sequence number.
    pub async fn publish_data(&self, content: impl Into<Bytes>) -> Result<u64> {
        self.inner.publish_data(content.into()).await
    }

    /// Outstanding fetches.
    pub fn in_flight(&self) -> usize {
        *lock(&self.inner.in_flight)
    }

    /// Fetches waiting for a free slot.
    pub fn queued(&self) -> usize {
        self.inner.config.fetch_queue_capacity - self.inner.queue_tx.capacity()
    }

    /// Shut down the core, the relay and the data handler, then close the
    /// store. No data handler call starts after this returns.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = inner.shutdown_tx.send(true);
        inner.core.shutdown().await;

        let relay = lock(&inner.relay).take();
        if let Some(relay) = relay {
            if let Err(e) = relay.await {
                warn!(error = %e, "relay task ended abnormally");
            }
        }

        let serving = lock(&inner.serving).take();
        if let Some(prefix) = serving {
            inner.transport.detach_handler(&prefix).await;
            inner.transport.unregister_route(&prefix).await;
        }

        *inner.delivery.write().await = false;
        if let Err(e) = inner.store.close().await {
            warn!(error = %e, "failed to close store");
        }
        info!(source = %inner.options.source, "fetch coordinator shut down");
    }
}

impl<T: Transport, S: Store + ?Sized + 'static> FetchInner<T, S> {
    fn has_capacity(&self, in_flight: usize) -> bool {
        let max = self.config.max_concurrent_fetches;
        max == 0 || in_flight < max
    }

    async fn need_data(self: &Arc<Self>, source: Name, seq: u64, cache: bool) {
        let item = FetchItem {
            source,
            seq,
            retries: self.config.fetch_retries,
            cache,
        };

        let admitted = {
            let mut in_flight = lock(&self.in_flight);
            if self.has_capacity(*in_flight) {
                *in_flight += 1;
                true
            } else {
                false
            }
        };
        if admitted {
            self.spawn_fetch(item);
            return;
        }

        trace!(source = %item.source, seq = item.seq, "fetch queued");
        if self.queue_tx.send(item).await.is_err() {
            warn!("fetch queue closed");
            return;
        }
        // A slot may have opened while this item waited for queue space.
        self.process_queue();
    }

    fn process_queue(self: &Arc<Self>) {
        let item = {
            let mut in_flight = lock(&self.in_flight);
            if !self.has_capacity(*in_flight) {
                return;
            }
            match lock(&self.queue_rx).try_recv() {
                Ok(item) => {
                    *in_flight += 1;
                    item
                }
                Err(_) => return,
            }
        };
        self.spawn_fetch(item);
    }

    fn spawn_fetch(self: &Arc<Self>, item: FetchItem) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.fetch(item).await });
    }

    async fn fetch(self: Arc<Self>, item: FetchItem) {
        let name = self.options.naming.data_name(&item.source, item.seq);
        let mut retries = item.retries;

        let outcome = loop {
            let request =
                Request::new(name.clone(), self.config.data_request_lifetime).must_be_fresh(true);
            let failure = match self.transport.send_request(request).await {
                Ok(RequestOutcome::Data(wire)) => break self.accept(&name, wire, item.cache).await,
                Ok(RequestOutcome::Nack(reason)) => {
                    break FetchOutcome::Unfetchable(Unfetchable::Nack(reason))
                }
                Ok(RequestOutcome::Timeout) => Unfetchable::Timeout,
                Err(e) => Unfetchable::Transport(e.to_string()),
            };
            if retries == 0 || self.closed.load(Ordering::SeqCst) {
                break FetchOutcome::Unfetchable(failure);
            }
            retries -= 1;
            debug!(name = %name, ?failure, retries, "retrying fetch");
        };

        if let FetchOutcome::Unfetchable(reason) = &outcome {
            warn!(source = %item.source, seq = item.seq, ?reason, "data unfetchable");
        }
        self.deliver(FetchResult {
            source: item.source,
            seq: item.seq,
            outcome,
        })
        .await;

        {
            let mut in_flight = lock(&self.in_flight);
            *in_flight = in_flight.saturating_sub(1);
        }
        self.process_queue();
    }

    /// Decode and verify a reply, caching it if asked.
    async fn accept(&self, name: &Name, wire: Bytes, cache: bool) -> FetchOutcome {
        let packet = match DataPacket::decode(&wire) {
            Ok(packet) => packet,
            Err(e) => return FetchOutcome::Unfetchable(Unfetchable::Malformed(e.to_string())),
        };
        if packet.name() != name {
            return FetchOutcome::Unfetchable(Unfetchable::Malformed(format!(
                "expected {}, got {}",
                name,
                packet.name()
            )));
        }
        if let Err(e) = packet.verify(self.options.verifier.as_ref()) {
            return FetchOutcome::Unfetchable(Unfetchable::Malformed(e.to_string()));
        }
        if cache {
            if let Err(e) = self.store.set(&name.encode(), &wire).await {
                warn!(name = %name, error = %e, "failed to cache fetched packet");
            }
        }
        debug!(name = %name, "fetched data");
        FetchOutcome::Fetched(packet)
    }

    async fn deliver(&self, result: FetchResult) {
        let open = self.delivery.read().await;
        if *open {
            self.handler.on_data(result).await;
        }
    }

    async fn publish_data(&self, content: Bytes) -> Result<u64> {
        let _guard = self.publish_lock.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::Shutdown);
        }

        let source = &self.options.source;
        let seq = self.core.seq(source) + 1;
        let name = self.options.naming.data_name(source, seq);
        let wire = DataPacket::new(name.clone(), content)
            .with_freshness(self.config.data_freshness)
            .sign(self.options.signer.as_ref())
            .encode();

        if wire.len() > MAX_PACKET_SIZE {
            warn!(name = %name, size = wire.len(), "publication too large");
            return Err(SyncError::PublicationTooLarge {
                size: wire.len(),
                limit: MAX_PACKET_SIZE,
            });
        }

        let key = name.encode();
        self.store.set(&key, &wire).await?;
        self.core.update(source, seq);
        if self.core.seq(source) != seq {
            self.store.remove(&key).await?;
            warn!(name = %name, "core rejected publication");
            return Err(SyncError::UpdateRejected {
                source_name: source.to_string(),
                seq,
            });
        }
        info!(name = %name, "published data");
        Ok(seq)
    }
}

/// Forward missing ranges from the core into fetches until shutdown.
async fn relay<T: Transport, S: Store + ?Sized + 'static>(
    inner: Weak<FetchInner<T, S>>,
    mut updates: mpsc::Receiver<Vec<MissingData>>,
    mut shutdown: watch::Receiver<bool>,
    handling: HandlingPolicy,
) {
    loop {
        let batch = tokio::select! {
            batch = updates.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
            _ = shutdown.changed() => break,
        };
        let Some(fetcher) = inner.upgrade() else {
            break;
        };
        let cache = fetcher.options.cache_others;
        for (source, seq) in handling.plan(batch) {
            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                _ = fetcher.need_data(source, seq, cache) => {}
                _ = shutdown.changed() => return,
            }
        }
    }
    debug!("missing-data relay exited");
}

/// Serves stored packets by exact name.
struct DataServer<S: Store + ?Sized> {
    store: Arc<S>,
}

#[async_trait]
impl<S: Store + ?Sized + 'static> RequestHandler for DataServer<S> {
    async fn on_request(&self, request: &Request) -> Option<Bytes> {
        match self.store.get(&request.name.encode()).await {
            Ok(Some(wire)) => {
                debug!(name = %request.name, "serving data");
                Some(wire)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(name = %request.name, error = %e, "failed to read store");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TwoStateCore;
    use crate::naming::NamingScheme;
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use svs_store::{MemoryStore, StoreError};

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn config() -> SyncConfig {
        SyncConfig {
            rng_seed: Some(3),
            ..SyncConfig::default()
        }
    }

    type Coordinator<T> = FetchCoordinator<T, MemoryStore>;

    fn coordinator<T: Transport>(
        transport: Arc<T>,
        source: &str,
        config: SyncConfig,
        configure: impl FnOnce(&mut FetchOptions),
    ) -> (Coordinator<T>, mpsc::UnboundedReceiver<FetchResult>) {
        let naming = DataNaming::new(name("/g"), NamingScheme::GroupOriented);
        let core = TwoStateCore::new(
            Arc::clone(&transport),
            naming.sync_prefix(),
            &name(source),
            config.clone(),
        )
        .unwrap();
        let mut options = FetchOptions::new(name(source), naming);
        configure(&mut options);
        let (tx, rx) = mpsc::unbounded_channel();
        let fetcher = FetchCoordinator::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(core),
            config,
            options,
            Arc::new(tx),
        )
        .unwrap();
        (fetcher, rx)
    }

    async fn node(
        network: &Arc<MemoryNetwork>,
        source: &str,
        configure: impl FnOnce(&mut FetchOptions),
    ) -> (Coordinator<MemoryTransport>, mpsc::UnboundedReceiver<FetchResult>) {
        let transport = Arc::new(network.create_transport().await);
        let (fetcher, rx) = coordinator(transport, source, config(), configure);
        fetcher.listen().await.unwrap();
        fetcher.activate(false);
        (fetcher, rx)
    }

    #[test]
    fn test_source_centric_plan() {
        let batch = vec![
            MissingData::new(name("/a"), 1, 3),
            MissingData::new(name("/b"), 5, 6),
        ];
        let plan: Vec<_> = HandlingPolicy::SourceCentric
            .plan(batch)
            .map(|(s, seq)| (s.to_string(), seq))
            .collect();
        assert_eq!(
            plan,
            vec![
                ("/a".into(), 1),
                ("/a".into(), 2),
                ("/a".into(), 3),
                ("/b".into(), 5),
                ("/b".into(), 6)
            ]
        );
    }

    #[test]
    fn test_equal_traffic_plan() {
        let batch = vec![
            MissingData::new(name("/a"), 1, 3),
            MissingData::new(name("/b"), 5, 5),
            MissingData::new(name("/c"), 7, 8),
        ];
        let plan: Vec<_> = HandlingPolicy::EqualTraffic
            .plan(batch)
            .map(|(s, seq)| (s.to_string(), seq))
            .collect();
        assert_eq!(
            plan,
            vec![
                ("/a".into(), 1),
                ("/b".into(), 5),
                ("/c".into(), 7),
                ("/a".into(), 2),
                ("/c".into(), 8),
                ("/a".into(), 3)
            ]
        );
    }

    #[test]
    fn test_manual_plan_is_empty() {
        let batch = vec![MissingData::new(name("/a"), 1, 3)];
        assert_eq!(HandlingPolicy::Manual.plan(batch).count(), 0);
    }

    #[tokio::test]
    async fn test_publish_stores_then_updates() {
        let network = MemoryNetwork::new();
        let (fetcher, _rx) = node(&network, "/a", |_| {}).await;

        assert_eq!(fetcher.publish_data(&b"one"[..]).await.unwrap(), 1);
        assert_eq!(fetcher.publish_data(&b"two"[..]).await.unwrap(), 2);
        assert_eq!(fetcher.core().seq(&name("/a")), 2);

        let key = name("/g/data/a/seq=2").encode();
        let wire = fetcher.store().get(&key).await.unwrap().unwrap();
        let packet = DataPacket::decode(&wire).unwrap();
        assert_eq!(packet.content().as_ref(), b"two");
        assert_eq!(packet.freshness(), Some(Duration::from_secs(5)));
        fetcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_too_large_does_not_advance() {
        let network = MemoryNetwork::new();
        let (fetcher, _rx) = node(&network, "/a", |_| {}).await;

        let result = fetcher.publish_data(vec![0u8; MAX_PACKET_SIZE]).await;
        assert!(matches!(
            result,
            Err(SyncError::PublicationTooLarge { limit: MAX_PACKET_SIZE, .. })
        ));
        assert_eq!(fetcher.core().seq(&name("/a")), 0);
        assert!(fetcher.store().is_empty());
        fetcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_claims_source_on_foreign_core() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.create_transport().await);
        let naming = DataNaming::new(name("/g"), NamingScheme::GroupOriented);
        let core =
            TwoStateCore::new(Arc::clone(&transport), naming.sync_prefix(), &name("/a"), config())
                .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let fetcher = FetchCoordinator::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(core),
            config(),
            FetchOptions::new(name("/b"), naming),
            Arc::new(tx),
        )
        .unwrap();

        assert_eq!(fetcher.publish_data(&b"one"[..]).await.unwrap(), 1);
        assert_eq!(fetcher.publish_data(&b"two"[..]).await.unwrap(), 2);
        assert_eq!(fetcher.core().seq(&name("/b")), 2);
        assert_eq!(fetcher.store().len(), 2);
        fetcher.shutdown().await;
    }

    /// Delegates everything except local updates, which it drops.
    struct FrozenCore(TwoStateCore<MemoryTransport>);

    #[async_trait]
    impl SyncCore for FrozenCore {
        async fn listen(&self) -> Result<()> {
            self.0.listen().await
        }
        fn activate(&self, fire_now: bool) {
            self.0.activate(fire_now)
        }
        async fn shutdown(&self) {
            self.0.shutdown().await
        }
        fn update(&self, _source: &Name, _seq: u64) {}
        fn seq(&self, source: &Name) -> u64 {
            self.0.seq(source)
        }
        fn state_vector(&self) -> svs_core::StateVector {
            self.0.state_vector()
        }
        fn subscribe(&self) -> mpsc::Receiver<Vec<MissingData>> {
            self.0.subscribe()
        }
        fn claim_source(&self, _source: &Name) {}
        async fn feed_request(&self, request: &Request) {
            self.0.feed_request(request).await
        }
        fn state(&self) -> crate::core::CoreState {
            self.0.state()
        }
    }

    #[tokio::test]
    async fn test_rejected_update_fails_publish_and_drops_packet() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.create_transport().await);
        let naming = DataNaming::new(name("/g"), NamingScheme::GroupOriented);
        let core =
            TwoStateCore::new(Arc::clone(&transport), naming.sync_prefix(), &name("/a"), config())
                .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let fetcher = FetchCoordinator::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(FrozenCore(core)),
            config(),
            FetchOptions::new(name("/a"), naming),
            Arc::new(tx),
        )
        .unwrap();

        for _ in 0..2 {
            let result = fetcher.publish_data(&b"lost"[..]).await;
            assert!(matches!(result, Err(SyncError::UpdateRejected { seq: 1, .. })));
        }
        assert_eq!(fetcher.core().seq(&name("/a")), 0);
        assert!(fetcher.store().is_empty());
        fetcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_data_reaches_peer() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = node(&network, "/a", |_| {}).await;
        let (b, mut b_rx) = node(&network, "/b", |_| {}).await;

        a.publish_data(&b"hello"[..]).await.unwrap();
        let result = b_rx.recv().await.unwrap();
        assert_eq!(result.source, name("/a"));
        assert_eq!(result.seq, 1);
        assert_eq!(result.packet().unwrap().content().as_ref(), b"hello");

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_others_stores_fetched_packets() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = node(&network, "/a", |_| {}).await;
        let (b, mut b_rx) = node(&network, "/b", |o| o.cache_others = true).await;

        a.publish_data(&b"cached"[..]).await.unwrap();
        b_rx.recv().await.unwrap();
        let key = name("/g/data/a/seq=1").encode();
        assert!(b.store().get(&key).await.unwrap().is_some());

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = node(&network, "/a", |_| {}).await;
        let (b, mut b_rx) = node(&network, "/b", |o| o.handling = HandlingPolicy::Manual).await;
        a.publish_data(&b"x"[..]).await.unwrap();
        // Let the announcement go out before arming the drops.
        tokio::time::sleep(Duration::from_millis(10)).await;
        network.clear_sent();

        network.drop_next(2);
        b.need_data(&name("/a"), 1).await;
        let result = b_rx.recv().await.unwrap();
        assert!(result.packet().is_some());
        assert_eq!(network.count_sent_under(&name("/g/data")), 3);

        network.clear_sent();
        network.drop_next(3);
        b.need_data(&name("/a"), 1).await;
        let result = b_rx.recv().await.unwrap();
        assert_eq!(
            result.outcome,
            FetchOutcome::Unfetchable(Unfetchable::Timeout)
        );
        assert_eq!(network.count_sent_under(&name("/g/data")), 3);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_nack_is_not_retried() {
        let network = MemoryNetwork::new();
        let (b, mut b_rx) = node(&network, "/b", |o| o.handling = HandlingPolicy::Manual).await;

        b.need_data(&name("/nobody"), 1).await;
        let result = b_rx.recv().await.unwrap();
        assert_eq!(
            result.outcome,
            FetchOutcome::Unfetchable(Unfetchable::Nack(NackReason::NoRoute))
        );
        assert_eq!(network.count_sent_under(&name("/g/data")), 1);
        b.shutdown().await;
    }

    struct Garbage;

    #[async_trait]
    impl RequestHandler for Garbage {
        async fn on_request(&self, _request: &Request) -> Option<Bytes> {
            Some(Bytes::from_static(&[0x06, 0x01, 0x00]))
        }
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let network = MemoryNetwork::new();
        let rogue = network.create_transport().await;
        rogue
            .attach_handler(&name("/g/data"), Arc::new(Garbage))
            .await
            .unwrap();
        rogue.register_route(&name("/g/data")).await.unwrap();
        let (b, mut b_rx) = node(&network, "/b", |o| o.handling = HandlingPolicy::Manual).await;

        b.need_data(&name("/a"), 1).await;
        let result = b_rx.recv().await.unwrap();
        assert!(matches!(
            result.outcome,
            FetchOutcome::Unfetchable(Unfetchable::Malformed(_))
        ));
        b.shutdown().await;
    }

    /// A transport whose requests never complete.
    #[derive(Default)]
    struct Stall {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Stall {
        async fn attach_handler(&self, _: &Name, _: Arc<dyn RequestHandler>) -> Result<()> {
            Ok(())
        }
        async fn detach_handler(&self, _: &Name) {}
        async fn register_route(&self, _: &Name) -> Result<()> {
            Ok(())
        }
        async fn unregister_route(&self, _: &Name) {}
        async fn send_request(&self, _: Request) -> Result<RequestOutcome> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let transport = Arc::new(Stall::default());
        let config = SyncConfig {
            max_concurrent_fetches: 3,
            ..config()
        };
        let (fetcher, _rx) = coordinator(Arc::clone(&transport), "/b", config, |o| {
            o.handling = HandlingPolicy::Manual
        });

        for seq in 1..=7 {
            fetcher.need_data(&name("/a"), seq).await;
        }
        tokio::task::yield_now().await;

        assert_eq!(fetcher.in_flight(), 3);
        assert_eq!(fetcher.queued(), 4);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unlimited_concurrency() {
        let transport = Arc::new(Stall::default());
        let config = SyncConfig {
            max_concurrent_fetches: 0,
            ..config()
        };
        let (fetcher, _rx) = coordinator(transport, "/b", config, |o| {
            o.handling = HandlingPolicy::Manual
        });
        for seq in 1..=50 {
            fetcher.need_data(&name("/a"), seq).await;
        }
        assert_eq!(fetcher.in_flight(), 50);
        assert_eq!(fetcher.queued(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_store_and_is_idempotent() {
        let network = MemoryNetwork::new();
        let (fetcher, _rx) = node(&network, "/a", |_| {}).await;
        fetcher.publish_data(&b"x"[..]).await.unwrap();

        fetcher.shutdown().await;
        fetcher.shutdown().await;

        assert!(matches!(
            fetcher.store().get(b"k").await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            fetcher.publish_data(&b"y"[..]).await,
            Err(SyncError::Shutdown)
        ));
    }
}
