//! Proptest generators for property-based testing.

use proptest::prelude::*;

use svs_core::{Component, Name, StateVector, VectorOrdering};

/// A generic component of 1 to 8 lowercase characters.
pub fn component() -> impl Strategy<Value = Component> {
    "[a-z0-9-]{1,8}".prop_map(|s| Component::generic(s.into_bytes()))
}

/// A non-empty name of up to four generic components.
pub fn name() -> impl Strategy<Value = Name> {
    prop::collection::vec(component(), 1..=4).prop_map(Name::from)
}

/// A valid sequence number.
pub fn seq() -> impl Strategy<Value = u64> {
    prop_oneof![
        1u64..=300,
        1u64..=u64::MAX,
    ]
}

/// Payload bytes of at most `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// A canonical state vector with up to `max_entries` distinct sources.
pub fn state_vector(max_entries: usize) -> impl Strategy<Value = StateVector> {
    state_vector_with(VectorOrdering::Canonical, max_entries)
}

pub fn state_vector_with(
    ordering: VectorOrdering,
    max_entries: usize,
) -> impl Strategy<Value = StateVector> {
    prop::collection::btree_map(name(), seq(), 0..=max_entries).prop_map(move |entries| {
        let mut vector = StateVector::with_ordering(ordering);
        for (name, seq) in &entries {
            vector.set_name(name, *seq, true);
        }
        vector
    })
}
