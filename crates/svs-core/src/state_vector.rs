//! The state vector: a mergeable, ordered map from source to sequence number.
//!
//! ## Ordering
//!
//! A vector is built with one [`VectorOrdering`], fixed for its lifetime:
//!
//! - [`VectorOrdering::Canonical`] keeps entries sorted by canonical name
//!   order, so two nodes holding the same state encode identical bytes.
//! - [`VectorOrdering::LatestEntriesFirst`] moves an entry to the front each
//!   time it receives a live update, so scans of "what changed recently"
//!   touch only the head of the vector.
//!
//! ## Wire format
//!
//! ```text
//! StateVector  ::= TYPE(0xC9) LENGTH Entry*
//! Entry        ::= TYPE(0xCA) LENGTH Name EntrySeqno
//! EntrySeqno   ::= TYPE(0xCC) LENGTH VarNum(sequence)
//! ```
//!
//! The informal format drops the `Entry` wrapper and concatenates
//! `Name EntrySeqno` pairs directly.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::name::{Component, Name};
use crate::tlv::{self, types, TlvReader};

/// Iteration order of a [`StateVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorOrdering {
    /// Ascending canonical name order.
    #[default]
    Canonical,
    /// Most recently updated entries first.
    LatestEntriesFirst,
}

impl VectorOrdering {
    /// Where a key absent from `entries` should be inserted.
    fn insert_position(self, entries: &[Entry], name: &Name, historical: bool) -> usize {
        match self {
            Self::Canonical => entries.partition_point(|e| e.name < *name),
            Self::LatestEntriesFirst if historical => entries.len(),
            Self::LatestEntriesFirst => 0,
        }
    }

    /// Whether a live update to an existing entry moves it to the front.
    fn promotes_on_update(self, historical: bool) -> bool {
        matches!(self, Self::LatestEntriesFirst) && !historical
    }
}

/// Which of the two wire encodings to produce or accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorFormat {
    /// Each pair is wrapped in an `Entry` (0xCA) element.
    #[default]
    Formal,
    /// Pairs are concatenated without the `Entry` wrapper.
    Informal,
}

/// One source's entry in a state vector.
#[derive(Debug, Clone)]
pub struct Entry {
    key: String,
    name: Name,
    seq: u64,
    last_update: Option<Instant>,
}

impl Entry {
    /// The canonical string form of the source name.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When this entry last received a live update, if ever.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    fn encoded_pair_len(&self) -> usize {
        self.name.encoded_len() + tlv::tlv_len(types::ENTRY_SEQNO, tlv::varnum_len(self.seq))
    }

    fn encode_pair_into(&self, buf: &mut Vec<u8>) {
        self.name.encode_into(buf);
        tlv::write_header(buf, types::ENTRY_SEQNO, tlv::varnum_len(self.seq));
        tlv::write_varnum(buf, self.seq);
    }
}

/// An ordered map from source name to the highest known sequence number.
///
/// Sequence number 0 is the sentinel for "never published": [`get`] returns
/// it for absent keys.
///
/// [`get`]: StateVector::get
#[derive(Clone, Default)]
pub struct StateVector {
    ordering: VectorOrdering,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl StateVector {
    /// An empty vector in canonical order.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ordering(ordering: VectorOrdering) -> Self {
        Self {
            ordering,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn ordering(&self) -> VectorOrdering {
        self.ordering
    }

    /// Insert or overwrite the sequence number for `key`.
    ///
    /// A live update (`historical == false`) refreshes the entry's update
    /// time and, in latest-first order, moves it to the front. Historical
    /// updates, used when rebuilding a vector from wire bytes, skip both.
    ///
    /// Returns `true` if the key was already present.
    pub fn set(&mut self, key: &str, name: &Name, seq: u64, historical: bool) -> bool {
        let now = (!historical).then(Instant::now);

        if let Some(&idx) = self.index.get(key) {
            let entry = &mut self.entries[idx];
            if !historical && seq < entry.seq {
                warn!(source = %key, current = entry.seq, requested = seq, "state vector entry lowered");
            }
            entry.seq = seq;
            if now.is_some() {
                entry.last_update = now;
            }
            if self.ordering.promotes_on_update(historical) && idx != 0 {
                let entry = self.entries.remove(idx);
                self.entries.insert(0, entry);
                self.reindex(0, idx + 1);
            }
            return true;
        }

        let pos = self.ordering.insert_position(&self.entries, name, historical);
        self.entries.insert(
            pos,
            Entry {
                key: key.to_owned(),
                name: name.clone(),
                seq,
                last_update: now,
            },
        );
        self.reindex(pos, self.entries.len());
        false
    }

    /// [`set`](Self::set) with the key derived from `name`.
    pub fn set_name(&mut self, name: &Name, seq: u64, historical: bool) -> bool {
        self.set(&name.to_string(), name, seq, historical)
    }

    /// Sequence number for `key`, or 0 if absent.
    pub fn get(&self, key: &str) -> u64 {
        self.entry(key).map_or(0, |e| e.seq)
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.index.get(key).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn last_update(&self, key: &str) -> Option<Instant> {
        self.entry(key).and_then(Entry::last_update)
    }

    /// Entries in this vector's order.
    ///
    /// The iterator is double-ended; call again for another full pass.
    pub fn entries(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all sequence numbers, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.seq))
    }

    /// Independent deep copy.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn reindex(&mut self, from: usize, to: usize) {
        for idx in from..to.min(self.entries.len()) {
            self.index.insert(self.entries[idx].key.clone(), idx);
        }
    }

    fn value_len(&self, format: VectorFormat) -> usize {
        self.entries
            .iter()
            .map(|e| match format {
                VectorFormat::Formal => tlv::tlv_len(types::STATE_VECTOR_ENTRY, e.encoded_pair_len()),
                VectorFormat::Informal => e.encoded_pair_len(),
            })
            .sum()
    }

    fn encode_value_into(&self, buf: &mut Vec<u8>, format: VectorFormat) {
        for entry in &self.entries {
            if format == VectorFormat::Formal {
                tlv::write_header(buf, types::STATE_VECTOR_ENTRY, entry.encoded_pair_len());
            }
            entry.encode_pair_into(buf);
        }
    }

    /// Full TLV encoding, including the outer `0xC9` header.
    pub fn encode(&self, format: VectorFormat) -> Vec<u8> {
        let value_len = self.value_len(format);
        let mut buf = Vec::with_capacity(tlv::tlv_len(types::STATE_VECTOR, value_len));
        tlv::write_header(&mut buf, types::STATE_VECTOR, value_len);
        self.encode_value_into(&mut buf, format);
        buf
    }

    /// The vector as a name component of type `0xC9`.
    pub fn to_component(&self, format: VectorFormat) -> Component {
        let mut value = Vec::with_capacity(self.value_len(format));
        self.encode_value_into(&mut value, format);
        Component::new(types::STATE_VECTOR, value)
    }

    /// Decode a full TLV encoding.
    ///
    /// An empty buffer yields an empty vector. Any other input must be a
    /// single `0xC9` element with no trailing bytes.
    pub fn decode(bytes: &[u8], format: VectorFormat, ordering: VectorOrdering) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::with_ordering(ordering));
        }
        let mut pos = 0;
        let value = tlv::expect_tlv(bytes, &mut pos, types::STATE_VECTOR)?;
        if pos != bytes.len() {
            return Err(CoreError::TrailingBytes(bytes.len() - pos));
        }
        Self::decode_value(value, format, ordering)
    }

    /// Decode a vector carried as a name component.
    pub fn from_component(
        component: &Component,
        format: VectorFormat,
        ordering: VectorOrdering,
    ) -> Result<Self> {
        if component.typ() != types::STATE_VECTOR {
            return Err(CoreError::UnexpectedType {
                expected: types::STATE_VECTOR,
                found: component.typ(),
            });
        }
        Self::decode_value(component.value(), format, ordering)
    }

    fn decode_value(value: &[u8], format: VectorFormat, ordering: VectorOrdering) -> Result<Self> {
        let mut vector = Self::with_ordering(ordering);
        match format {
            VectorFormat::Formal => {
                for item in TlvReader::new(value) {
                    let (typ, pair) = item?;
                    if typ != types::STATE_VECTOR_ENTRY {
                        return Err(CoreError::UnexpectedType {
                            expected: types::STATE_VECTOR_ENTRY,
                            found: typ,
                        });
                    }
                    let mut pos = 0;
                    let (name, seq) = decode_pair(pair, &mut pos)?;
                    if pos != pair.len() {
                        return Err(CoreError::TrailingBytes(pair.len() - pos));
                    }
                    vector.set_name(&name, seq, true);
                }
            }
            VectorFormat::Informal => {
                let mut pos = 0;
                while pos < value.len() {
                    let (name, seq) = decode_pair(value, &mut pos)?;
                    vector.set_name(&name, seq, true);
                }
            }
        }
        Ok(vector)
    }
}

fn decode_pair(buf: &[u8], pos: &mut usize) -> Result<(Name, u64)> {
    let name = Name::decode_value(tlv::expect_tlv(buf, pos, types::NAME)?)?;
    let seq_value = tlv::expect_tlv(buf, pos, types::ENTRY_SEQNO)?;
    let mut seq_pos = 0;
    let seq = tlv::read_varnum(seq_value, &mut seq_pos)?;
    if seq_pos != seq_value.len() {
        return Err(CoreError::TrailingBytes(seq_value.len() - seq_pos));
    }
    Ok((name, seq))
}

impl PartialEq for StateVector {
    /// Two vectors are equal when they map the same keys to the same
    /// sequence numbers. Update times and ordering mode are not compared.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|e| other.contains(&e.key) && other.get(&e.key) == e.seq)
    }
}

impl Eq for StateVector {}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", entry.key, entry.seq)?;
        }
        Ok(())
    }
}

impl fmt::Debug for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateVector({:?}, [{}])", self.ordering, self)
    }
}
