//! # SVS Store
//!
//! Packet storage for State Vector Sync. Provides a trait-based byte store
//! with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! A node stores every packet it publishes so it can serve data requests
//! from peers, and may also cache packets it fetches from others. Keys are
//! encoded packet names; values are full packet wire bytes.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use svs_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("node-a.db").unwrap();
//!     store.set(b"name", b"packet").await.unwrap();
//!     let packet = store.get(b"name").await.unwrap();
//!     assert!(packet.is_some());
//!     store.close().await.unwrap();
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::Store;
