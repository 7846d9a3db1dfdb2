//! # SVS Core
//!
//! Pure primitives for State Vector Sync: the NDN TLV codec, hierarchical
//! names, state vectors, and data packets.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`StateVector`] - Ordered map from source name to latest sequence number
//! - [`Name`] - Hierarchical, canonically ordered name
//! - [`MissingData`] - A sequence range discovered during a merge
//! - [`DataPacket`] - Named, signed content item
//!
//! ## Wire format
//!
//! All encodings follow NDN TLV conventions. See [`tlv`] for the integer
//! rules and [`state_vector`] for the vector layout.

pub mod crypto;
pub mod error;
pub mod missing;
pub mod name;
pub mod packet;
pub mod state_vector;
pub mod tlv;

pub use crypto::{
    AcceptAll, DigestSigner, DigestVerifier, Ed25519Signer, Ed25519Verifier, Signer, Verifier,
};
pub use error::{CoreError, Result};
pub use missing::MissingData;
pub use name::{Component, Name};
pub use packet::DataPacket;
pub use state_vector::{Entry, StateVector, VectorFormat, VectorOrdering};
