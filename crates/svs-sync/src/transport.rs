//! Transport abstraction for the sync engine.
//!
//! The engine speaks a request/response model: a request names what it
//! wants and carries a lifetime; any reachable handler whose prefix matches
//! may answer with packet bytes. Sync announcements are requests nobody
//! answers; they are delivered for their side effect on the receiver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use svs_core::Name;

use crate::error::Result;

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub name: Name,
    /// How long the requester waits for an answer.
    pub lifetime: Duration,
    /// Only fresh packets satisfy this request.
    pub must_be_fresh: bool,
    pub payload: Option<Bytes>,
}

impl Request {
    pub fn new(name: Name, lifetime: Duration) -> Self {
        Self {
            name,
            lifetime,
            must_be_fresh: false,
            payload: None,
        }
    }

    pub fn must_be_fresh(mut self, fresh: bool) -> Self {
        self.must_be_fresh = fresh;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Why a request was negatively acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackReason {
    /// No route matches the request name.
    NoRoute,
    Congestion,
    Duplicate,
}

/// How a request completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Packet wire bytes.
    Data(Bytes),
    Nack(NackReason),
    /// No answer within the request lifetime.
    Timeout,
}

/// Answers requests under an attached prefix.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Packet bytes to reply with, or `None` to stay silent.
    async fn on_request(&self, request: &Request) -> Option<Bytes>;
}

/// Transport trait for the sync engine.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Attach a handler for requests under `prefix`.
    ///
    /// Fails with [`SyncError::HandlerExists`](crate::SyncError::HandlerExists)
    /// if one is already attached there.
    async fn attach_handler(&self, prefix: &Name, handler: Arc<dyn RequestHandler>) -> Result<()>;

    async fn detach_handler(&self, prefix: &Name);

    /// Make this endpoint reachable for requests under `prefix`.
    async fn register_route(&self, prefix: &Name) -> Result<()>;

    async fn unregister_route(&self, prefix: &Name);

    /// Send a request and wait for its outcome.
    ///
    /// `Err` means the request could not be sent at all.
    async fn send_request(&self, request: Request) -> Result<RequestOutcome>;
}

/// An in-process multicast network for tests and single-process demos.
///
/// A request reaches every other endpoint that has a matching route and
/// handler. The first handler to reply wins; if none replies the request
/// times out after its lifetime.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tokio::sync::{mpsc, RwLock};
    use tracing::trace;

    use crate::error::SyncError;

    #[derive(Default)]
    struct Endpoint {
        handlers: Vec<(Name, Arc<dyn RequestHandler>)>,
        routes: Vec<Name>,
    }

    impl Endpoint {
        /// Longest-prefix handler for `name`, if a route also covers it.
        fn handler_for(&self, name: &Name) -> Option<Arc<dyn RequestHandler>> {
            if !self.routes.iter().any(|r| r.is_prefix_of(name)) {
                return None;
            }
            self.handlers
                .iter()
                .filter(|(prefix, _)| prefix.is_prefix_of(name))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, handler)| Arc::clone(handler))
        }
    }

    /// Shared state for the memory network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        endpoints: RwLock<HashMap<u64, Endpoint>>,
        next_id: AtomicU64,
        /// Requests to drop before delivery.
        drop_budget: AtomicUsize,
        sent: Mutex<Vec<(u64, Name)>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport connected to this network.
        pub async fn create_transport(self: &Arc<Self>) -> MemoryTransport {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.endpoints.write().await.insert(id, Endpoint::default());
            MemoryTransport {
                id,
                network: Arc::clone(self),
            }
        }

        /// Silently lose the next `count` requests sent by anyone.
        pub fn drop_next(&self, count: usize) {
            self.drop_budget.store(count, Ordering::SeqCst);
        }

        /// Names of every request sent so far, in send order.
        pub fn sent_requests(&self) -> Vec<Name> {
            self.sent_log().into_iter().map(|(_, name)| name).collect()
        }

        /// Number of requests sent under `prefix`.
        pub fn count_sent_under(&self, prefix: &Name) -> usize {
            self.sent_log()
                .iter()
                .filter(|(_, name)| prefix.is_prefix_of(name))
                .count()
        }

        pub fn clear_sent(&self) {
            if let Ok(mut sent) = self.sent.lock() {
                sent.clear();
            }
        }

        fn sent_log(&self) -> Vec<(u64, Name)> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }

        fn take_drop(&self) -> bool {
            self.drop_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    /// One endpoint on a [`MemoryNetwork`].
    pub struct MemoryTransport {
        id: u64,
        network: Arc<MemoryNetwork>,
    }

    impl MemoryTransport {
        pub fn id(&self) -> u64 {
            self.id
        }

        /// Leave the network. Later sends fail and nothing reaches this endpoint.
        pub async fn disconnect(&self) {
            self.network.endpoints.write().await.remove(&self.id);
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn attach_handler(
            &self,
            prefix: &Name,
            handler: Arc<dyn RequestHandler>,
        ) -> Result<()> {
            let mut endpoints = self.network.endpoints.write().await;
            let endpoint = endpoints
                .get_mut(&self.id)
                .ok_or_else(|| SyncError::Transport("endpoint disconnected".into()))?;
            if endpoint.handlers.iter().any(|(p, _)| p == prefix) {
                return Err(SyncError::HandlerExists(prefix.to_string()));
            }
            endpoint.handlers.push((prefix.clone(), handler));
            Ok(())
        }

        async fn detach_handler(&self, prefix: &Name) {
            if let Some(endpoint) = self.network.endpoints.write().await.get_mut(&self.id) {
                endpoint.handlers.retain(|(p, _)| p != prefix);
            }
        }

        async fn register_route(&self, prefix: &Name) -> Result<()> {
            let mut endpoints = self.network.endpoints.write().await;
            let endpoint = endpoints
                .get_mut(&self.id)
                .ok_or_else(|| SyncError::Transport("endpoint disconnected".into()))?;
            if !endpoint.routes.contains(prefix) {
                endpoint.routes.push(prefix.clone());
            }
            Ok(())
        }

        async fn unregister_route(&self, prefix: &Name) {
            if let Some(endpoint) = self.network.endpoints.write().await.get_mut(&self.id) {
                endpoint.routes.retain(|r| r != prefix);
            }
        }

        async fn send_request(&self, request: Request) -> Result<RequestOutcome> {
            let handlers: Vec<_> = {
                let endpoints = self.network.endpoints.read().await;
                if !endpoints.contains_key(&self.id) {
                    return Err(SyncError::Transport("endpoint disconnected".into()));
                }
                endpoints
                    .iter()
                    .filter(|(id, _)| **id != self.id)
                    .filter_map(|(_, endpoint)| endpoint.handler_for(&request.name))
                    .collect()
            };

            if let Ok(mut sent) = self.network.sent.lock() {
                sent.push((self.id, request.name.clone()));
            }

            if handlers.is_empty() {
                return Ok(RequestOutcome::Nack(NackReason::NoRoute));
            }

            let lifetime = request.lifetime;
            if self.network.take_drop() {
                trace!(name = %request.name, "request dropped");
                tokio::time::sleep(lifetime).await;
                return Ok(RequestOutcome::Timeout);
            }

            // Handlers run detached so a fast reply never cancels a slow one.
            let request = Arc::new(request);
            let (tx, mut rx) = mpsc::channel(handlers.len());
            for handler in handlers {
                let tx = tx.clone();
                let request = Arc::clone(&request);
                tokio::spawn(async move {
                    let reply = handler.on_request(&request).await;
                    let _ = tx.send(reply).await;
                });
            }
            drop(tx);

            let first_reply = async {
                while let Some(reply) = rx.recv().await {
                    if let Some(bytes) = reply {
                        return bytes;
                    }
                }
                std::future::pending().await
            };

            match tokio::time::timeout(lifetime, first_reply).await {
                Ok(bytes) => Ok(RequestOutcome::Data(bytes)),
                Err(_) => Ok(RequestOutcome::Timeout),
            }
        }
    }
}
