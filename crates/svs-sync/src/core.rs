//! The two-state sync core.
//!
//! ```text
//!              peer is behind
//!   Steady ───────────────────▶ Suppression
//!     ▲                              │
//!     └──────── scheduler fires ─────┘
//! ```
//!
//! In `Steady` every inbound vector is merged into the local vector. If the
//! peer turns out to be behind, the core enters `Suppression` and shortens
//! the scheduler to a brief jittered delay. Vectors that arrive while
//! suppressing are also accumulated in a `record`; when the timer fires the
//! record is merged and an announcement goes out only if the record still
//! shows a peer behind. With many nodes observing the same stale peer, the
//! first to fire answers and the rest stay quiet.

use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use svs_core::tlv::types;
use svs_core::{CoreError, MissingData, Name, StateVector, VectorFormat};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::scheduler::{lock, ScheduledTask, Scheduler};
use crate::transport::{Request, RequestHandler, RequestOutcome, Transport};

/// Protocol state of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreState {
    Steady = 0,
    Suppression = 1,
}

impl CoreState {
    fn from_u8(v: u8) -> Self {
        if v == Self::Suppression as u8 {
            Self::Suppression
        } else {
            Self::Steady
        }
    }
}

/// The sync protocol engine as seen by its callers.
#[async_trait]
pub trait SyncCore: Send + Sync {
    /// Attach the inbound handler and route for sync announcements.
    async fn listen(&self) -> Result<()>;

    /// Start periodic announcements, sending one right away if `fire_now`.
    fn activate(&self, fire_now: bool);

    /// Stop the scheduler, detach the handler and close every subscription.
    /// Safe to call more than once.
    async fn shutdown(&self);

    /// Raise the sequence number of a source this node owns.
    ///
    /// Zero, non-increasing, and foreign-source updates are logged and ignored.
    fn update(&self, source: &Name, seq: u64);

    /// Latest known sequence number for `source`, 0 if never seen.
    fn seq(&self, source: &Name) -> u64;

    /// Snapshot of the local state vector.
    fn state_vector(&self) -> StateVector;

    /// Receive a batch of missing ranges after every merge that finds any.
    ///
    /// The channel closes when the core shuts down.
    fn subscribe(&self) -> mpsc::Receiver<Vec<MissingData>>;

    /// Allow `update` for `source`.
    fn claim_source(&self, source: &Name);

    /// Process a sync request delivered outside the transport.
    async fn feed_request(&self, request: &Request);

    fn state(&self) -> CoreState;
}

/// Result of merging a vector into the local one.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The sender is missing something this node knows.
    pub is_newer: bool,
    pub missing: Vec<MissingData>,
}

/// Two-state (steady/suppression) sync core.
pub struct TwoStateCore<T: Transport> {
    inner: Arc<CoreInner<T>>,
}

struct CoreInner<T: Transport> {
    transport: Arc<T>,
    config: SyncConfig,
    format: VectorFormat,
    sync_prefix: Name,
    owned: Mutex<HashSet<String>>,
    vector: Mutex<StateVector>,
    record: Mutex<StateVector>,
    state: AtomicU8,
    scheduler: Scheduler,
    subscribers: Mutex<Vec<mpsc::Sender<Vec<MissingData>>>>,
    listening: AtomicBool,
    active: AtomicBool,
    closed: AtomicBool,
}

impl<T: Transport> TwoStateCore<T> {
    /// Create a core announcing under `sync_prefix` that owns `source`.
    pub fn new(
        transport: Arc<T>,
        sync_prefix: Name,
        source: &Name,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        let scheduler = Scheduler::new(config.sync_jitter(), config.rng_seed);
        let inner = CoreInner {
            transport,
            format: config.vector_format(),
            sync_prefix,
            owned: Mutex::new(HashSet::from([source.to_string()])),
            vector: Mutex::new(StateVector::with_ordering(config.ordering)),
            record: Mutex::new(StateVector::with_ordering(config.ordering)),
            state: AtomicU8::new(CoreState::Steady as u8),
            scheduler,
            subscribers: Mutex::new(Vec::new()),
            listening: AtomicBool::new(false),
            active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn sync_prefix(&self) -> &Name {
        &self.inner.sync_prefix
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Remaining time before the next scheduled announcement.
    pub fn time_left(&self) -> std::time::Duration {
        self.inner.scheduler.time_left()
    }

    /// Merge `incoming` into the local vector without notifying anyone.
    pub fn merge(&self, incoming: &StateVector) -> MergeOutcome {
        self.inner.merge(incoming)
    }
}

#[async_trait]
impl<T: Transport> SyncCore for TwoStateCore<T> {
    async fn listen(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.listening.load(Ordering::SeqCst) {
            return Ok(());
        }
        let handler = Arc::new(SyncRequestHandler {
            core: Arc::downgrade(inner),
        });
        inner
            .transport
            .attach_handler(&inner.sync_prefix, handler)
            .await?;
        if let Err(e) = inner.transport.register_route(&inner.sync_prefix).await {
            inner.transport.detach_handler(&inner.sync_prefix).await;
            return Err(e);
        }
        inner.listening.store(true, Ordering::SeqCst);
        info!(prefix = %inner.sync_prefix, "sync handler attached");
        Ok(())
    }

    fn activate(&self, fire_now: bool) {
        let weak = Arc::downgrade(&self.inner);
        let target: Weak<dyn ScheduledTask> = weak;
        self.inner.scheduler.start(target, fire_now);
        self.inner.active.store(true, Ordering::SeqCst);
        info!(prefix = %self.inner.sync_prefix, "core activated");
    }

    async fn shutdown(&self) {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        if inner.active.swap(false, Ordering::SeqCst) {
            inner.scheduler.stop().await;
        }
        if inner.listening.swap(false, Ordering::SeqCst) {
            inner.transport.detach_handler(&inner.sync_prefix).await;
            inner.transport.unregister_route(&inner.sync_prefix).await;
        }
        lock(&inner.subscribers).clear();
        info!(prefix = %inner.sync_prefix, "core shut down");
    }

    fn update(&self, source: &Name, seq: u64) {
        let inner = &self.inner;
        let key = source.to_string();
        if seq == 0 {
            warn!(source = %key, "ignoring update with sequence number 0");
            return;
        }
        if !lock(&inner.owned).contains(&key) {
            warn!(source = %key, seq, "ignoring update for a source this node does not own");
            return;
        }
        {
            let mut vector = lock(&inner.vector);
            let current = vector.get(&key);
            if seq <= current {
                warn!(source = %key, seq, current, "ignoring non-increasing update");
                return;
            }
            vector.set(&key, source, seq, false);
        }
        debug!(source = %key, seq, "local update");
        inner.scheduler.skip();
    }

    fn seq(&self, source: &Name) -> u64 {
        lock(&self.inner.vector).get(&source.to_string())
    }

    fn state_vector(&self) -> StateVector {
        lock(&self.inner.vector).copy()
    }

    fn subscribe(&self) -> mpsc::Receiver<Vec<MissingData>> {
        let (tx, rx) = mpsc::channel(self.inner.config.subscriber_capacity);
        if !self.inner.closed.load(Ordering::SeqCst) {
            lock(&self.inner.subscribers).push(tx);
        }
        rx
    }

    fn claim_source(&self, source: &Name) {
        lock(&self.inner.owned).insert(source.to_string());
    }

    async fn feed_request(&self, request: &Request) {
        self.inner.on_sync_request(request).await;
    }

    fn state(&self) -> CoreState {
        self.inner.state()
    }
}

impl<T: Transport> CoreInner<T> {
    fn state(&self) -> CoreState {
        CoreState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: CoreState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn merge(&self, incoming: &StateVector) -> MergeOutcome {
        let owned = lock(&self.owned);
        let mut vector = lock(&self.vector);
        let mut outcome = MergeOutcome::default();

        for entry in incoming.entries().rev() {
            let local = vector.get(entry.key());
            if local < entry.seq() {
                outcome
                    .missing
                    .push(MissingData::new(entry.name().clone(), local + 1, entry.seq()));
                vector.set(entry.key(), entry.name(), entry.seq(), false);
            } else if local > entry.seq() && !owned.contains(entry.key()) {
                if self.recently_updated(&vector, entry.key()) {
                    continue;
                }
                outcome.is_newer = true;
            }
        }
        if incoming.len() < vector.len() {
            outcome.is_newer = true;
        }
        outcome
    }

    fn recently_updated(&self, vector: &StateVector, key: &str) -> bool {
        self.config.efficient_suppression
            && vector
                .last_update(key)
                .is_some_and(|at| at.elapsed() < self.config.suppression_window)
    }

    /// Merge, then hand any missing ranges to subscribers.
    async fn merge_and_notify(&self, incoming: &StateVector) -> bool {
        let MergeOutcome { is_newer, missing } = self.merge(incoming);
        if !missing.is_empty() {
            self.notify(missing).await;
        }
        is_newer
    }

    /// Deliver one batch to every subscriber, waiting for queue space.
    async fn notify(&self, batch: Vec<MissingData>) {
        let subscribers = lock(&self.subscribers).clone();
        for tx in &subscribers {
            if tx.send(batch.clone()).await.is_err() {
                trace!("subscriber gone");
            }
        }
        lock(&self.subscribers).retain(|tx| !tx.is_closed());
    }

    /// Accumulate `incoming` into the suppression record, per-key max.
    fn record(&self, incoming: &StateVector) {
        let mut record = lock(&self.record);
        for entry in incoming.entries().rev() {
            if record.get(entry.key()) < entry.seq() {
                record.set(entry.key(), entry.name(), entry.seq(), false);
            }
        }
    }

    fn decode_request(&self, request: &Request) -> Result<StateVector> {
        let ordering = self.config.ordering;
        let component = request
            .name
            .components()
            .iter()
            .rev()
            .find(|c| c.typ() == types::STATE_VECTOR);
        let vector = match (component, &request.payload) {
            (Some(component), _) => StateVector::from_component(component, self.format, ordering)?,
            (None, Some(payload)) => StateVector::decode(payload, self.format, ordering)?,
            (None, None) => {
                return Err(CoreError::MalformedPacket("request carries no state vector".into()).into())
            }
        };
        Ok(vector)
    }

    async fn on_sync_request(&self, request: &Request) {
        let incoming = match self.decode_request(request) {
            Ok(vector) => vector,
            Err(e) => {
                warn!(name = %request.name, error = %e, "ignoring unparsable state vector");
                return;
            }
        };
        trace!(vector = %incoming, "received state vector");

        let is_newer = self.merge_and_notify(&incoming).await;

        if self.state() == CoreState::Suppression {
            self.record(&incoming);
            return;
        }

        if !is_newer {
            self.scheduler.reset();
            return;
        }

        self.set_state(CoreState::Suppression);
        let delay = self.scheduler.sample(&self.config.brief_jitter());
        if self.scheduler.time_left() > delay {
            self.scheduler.set(delay);
        }
        debug!(delay_ms = delay.as_millis() as u64, "entered suppression");
    }

    fn announce(&self) {
        let component = lock(&self.vector).to_component(self.format);
        let request = Request::new(
            self.sync_prefix.with(component),
            self.config.sync_request_lifetime,
        )
        .must_be_fresh(true);

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            match transport.send_request(request).await {
                Ok(RequestOutcome::Nack(reason)) => {
                    debug!(?reason, "sync announcement nacked");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to send sync announcement"),
            }
        });
    }
}

#[async_trait]
impl<T: Transport> ScheduledTask for CoreInner<T> {
    async fn fire(&self) {
        let record = mem::replace(
            &mut *lock(&self.record),
            StateVector::with_ordering(self.config.ordering),
        );
        let was_steady = self.state() == CoreState::Steady;
        let is_newer = self.merge_and_notify(&record).await;
        if was_steady || is_newer {
            self.announce();
        } else {
            debug!("announcement suppressed");
        }
        self.set_state(CoreState::Steady);
        lock(&self.record).clear();
    }
}

/// Inbound handler for sync announcements.
struct SyncRequestHandler<T: Transport> {
    core: Weak<CoreInner<T>>,
}

#[async_trait]
impl<T: Transport> RequestHandler for SyncRequestHandler<T> {
    async fn on_request(&self, request: &Request) -> Option<Bytes> {
        if let Some(core) = self.core.upgrade() {
            core.on_sync_request(request).await;
        }
        None
    }
}
