//! # SVS Testkit
//!
//! Testing utilities for State Vector Sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known wire encodings for cross-implementation checks
//! - **Generators**: Proptest strategies for names and state vectors
//! - **Fixtures**: An in-memory group that nodes can join
//!
//! ## Golden Vectors
//!
//! ```rust
//! use svs_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok) in verify_all_vectors() {
//!     assert!(ok, "{name}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use svs_testkit::generators::state_vector;
//!
//! proptest! {
//!     #[test]
//!     fn merge_with_self_is_noop(v in state_vector(8)) {
//!         let mut copy = v.copy();
//!         for entry in v.entries() {
//!             prop_assert!(!copy.set(entry.key(), entry.name(), entry.seq(), false));
//!         }
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use svs_testkit::fixtures::TestGroup;
//!
//! let group = TestGroup::new("/ndn/chat");
//! let (alice, mut fetched) = group.join("/alice").await;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, name, TestGroup};
