//! # SVS Sync
//!
//! The State Vector Sync protocol engine.
//!
//! ## Overview
//!
//! Every node keeps a state vector: for each data source it knows, the
//! highest sequence number that source has published. Nodes periodically
//! announce their vector to the group. A receiver merges the vector into its
//! own, learns which sequence ranges it is missing, and fetches them.
//!
//! ## Key Properties
//!
//! - **Leaderless**: every node announces and merges the same way
//! - **Self-healing**: lost announcements are repaired by the next cycle
//! - **Storm-free**: nodes that see a stale peer wait a brief random delay,
//!   and only the first to fire answers
//! - **Bounded**: fetches are capped and queued with backpressure
//!
//! ## Components
//!
//! - [`Scheduler`] - jittered periodic timer with skip/reset/set
//! - [`TwoStateCore`] - the steady/suppression state machine behind [`SyncCore`]
//! - [`FetchCoordinator`] - bounded, retrying fetches and publishing
//! - [`Transport`] - the request/response boundary, with an in-memory network
//!
//! ## Announcement Flow
//!
//! ```text
//! Node A                                   Node B
//!   | publish seq 1                           |
//!   |-- /g/sync/<vector {A:1}> -------------->| merge: missing A:[1,1]
//!   |<------------- /g/data/A/seq=1 ----------| fetch
//!   |-- Data ------------------------------->| deliver
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod fetch;
pub mod naming;
pub mod scheduler;
pub mod transport;

pub use crate::core::{CoreState, MergeOutcome, SyncCore, TwoStateCore};
pub use config::{SyncConfig, MAX_PACKET_SIZE};
pub use error::{Result, SyncError};
pub use fetch::{
    DataHandler, FetchCoordinator, FetchOptions, FetchOutcome, FetchResult, HandlingPolicy,
    Unfetchable,
};
pub use naming::{DataNaming, NamingScheme, DEFAULT_DATA_MARKER};
pub use scheduler::{Jitter, ScheduledTask, Scheduler};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, NackReason, Request, RequestHandler,
    RequestOutcome, Transport,
};
