//! # SVS
//!
//! State Vector Sync: leaderless synchronization of a shared dataset.
//!
//! ## Overview
//!
//! Each node publishes a numbered sequence of data packets under its own
//! source name. Nodes gossip compact state vectors, one sequence number per
//! source, and fetch whatever they discover they are missing.
//!
//! - **State vectors** are exchanged periodically and on every publish
//! - **Suppression** keeps many nodes from answering a stale peer at once
//! - **Fetching** is bounded, queued, and retried
//! - **Storage** keeps published packets servable across restarts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use svs::{MemoryNetwork, NodeConfig, SvsNode};
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let transport = std::sync::Arc::new(network.create_transport().await);
//!
//!     let config = NodeConfig::new("/alice".parse().unwrap(), "/ndn/chat".parse().unwrap());
//!     let (node, mut fetched) = SvsNode::open_with_channel(transport, config).await.unwrap();
//!     node.start(true);
//!
//!     node.publish(&b"hello"[..]).await.unwrap();
//!     while let Some(result) = fetched.recv().await {
//!         println!("{} #{}", result.source, result.seq);
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `svs::core` - TLV codec, names, state vectors, packets
//! - `svs::store` - packet storage
//! - `svs::sync` - scheduler, core, fetch coordinator, transport

pub mod config;
pub mod error;
pub mod node;

pub use svs_core as core;
pub use svs_store as store;
pub use svs_sync as sync;

pub use config::NodeConfig;
pub use error::{Result, SvsError};
pub use node::SvsNode;

pub use svs_core::{DataPacket, MissingData, Name, StateVector, VectorFormat, VectorOrdering};
pub use svs_sync::{
    CoreState, DataHandler, FetchOutcome, FetchResult, HandlingPolicy, MemoryNetwork,
    MemoryTransport, NamingScheme, SyncConfig, Transport, Unfetchable,
};
