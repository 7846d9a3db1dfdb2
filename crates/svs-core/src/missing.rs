//! Missing sequence ranges discovered while merging state vectors.

use std::fmt;
use std::ops::RangeInclusive;

use crate::name::Name;

/// A contiguous run of sequence numbers a peer has published for `source`
/// that the local node has not seen yet. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingData {
    pub source: Name,
    pub low_seq: u64,
    pub high_seq: u64,
}

impl MissingData {
    pub fn new(source: Name, low_seq: u64, high_seq: u64) -> Self {
        Self {
            source,
            low_seq,
            high_seq,
        }
    }

    /// Number of sequence numbers in the range.
    pub fn count(&self) -> u64 {
        if self.high_seq < self.low_seq {
            0
        } else {
            self.high_seq - self.low_seq + 1
        }
    }

    pub fn seqs(&self) -> RangeInclusive<u64> {
        self.low_seq..=self.high_seq
    }
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}, {}]", self.source, self.low_seq, self.high_seq)
    }
}
