//! Sync configuration.
//!
//! Durations are (de)serialized as integer milliseconds so a config file
//! reads `"sync_interval": 30000`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use svs_core::{VectorFormat, VectorOrdering};

use crate::error::{Result, SyncError};
use crate::scheduler::Jitter;

/// Largest encoded data packet a node will publish.
pub const MAX_PACKET_SIZE: usize = 8800;

/// Configuration for the core and the fetch coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base period between sync announcements.
    #[serde(with = "millis")]
    pub sync_interval: Duration,
    /// Fractional jitter applied to `sync_interval`.
    pub sync_interval_jitter: f64,
    /// Base delay before answering a peer that is behind.
    #[serde(with = "millis")]
    pub brief_interval: Duration,
    pub brief_interval_jitter: f64,
    /// Lifetime of outgoing data requests.
    #[serde(with = "millis")]
    pub data_request_lifetime: Duration,
    /// Freshness period stamped on published packets.
    #[serde(with = "millis")]
    pub data_freshness: Duration,
    /// Lifetime of outgoing sync announcements.
    #[serde(with = "millis")]
    pub sync_request_lifetime: Duration,
    /// Cap on outstanding fetches. 0 means unlimited.
    pub max_concurrent_fetches: usize,
    /// Reissues allowed after a fetch times out.
    pub fetch_retries: u32,
    /// Capacity of the pending fetch queue.
    pub fetch_queue_capacity: usize,
    /// Capacity of each subscriber's missing-range queue.
    pub subscriber_capacity: usize,
    /// Use the formal (Entry-wrapped) state vector encoding.
    pub formal_encoding: bool,
    /// Ignore "peer is behind" for entries updated within `suppression_window`.
    pub efficient_suppression: bool,
    #[serde(with = "millis")]
    pub suppression_window: Duration,
    /// Iteration order of the local state vector.
    pub ordering: VectorOrdering,
    /// Seed for jitter randomness. Entropy-seeded when absent.
    pub rng_seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_millis(30_000),
            sync_interval_jitter: 0.10,
            brief_interval: Duration::from_millis(200),
            brief_interval_jitter: 0.50,
            data_request_lifetime: Duration::from_millis(2_000),
            data_freshness: Duration::from_millis(5_000),
            sync_request_lifetime: Duration::from_millis(1_000),
            max_concurrent_fetches: 10,
            fetch_retries: 2,
            fetch_queue_capacity: 2048,
            subscriber_capacity: 64,
            formal_encoding: true,
            efficient_suppression: false,
            suppression_window: Duration::from_millis(200),
            ordering: VectorOrdering::Canonical,
            rng_seed: None,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval.is_zero() {
            return Err(SyncError::Config("sync_interval must be positive".into()));
        }
        if self.brief_interval.is_zero() {
            return Err(SyncError::Config("brief_interval must be positive".into()));
        }
        for (field, frac) in [
            ("sync_interval_jitter", self.sync_interval_jitter),
            ("brief_interval_jitter", self.brief_interval_jitter),
        ] {
            if !(0.0..=1.0).contains(&frac) {
                return Err(SyncError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    field, frac
                )));
            }
        }
        if self.fetch_queue_capacity == 0 {
            return Err(SyncError::Config(
                "fetch_queue_capacity must be positive".into(),
            ));
        }
        if self.subscriber_capacity == 0 {
            return Err(SyncError::Config(
                "subscriber_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn vector_format(&self) -> VectorFormat {
        if self.formal_encoding {
            VectorFormat::Formal
        } else {
            VectorFormat::Informal
        }
    }

    /// Jitter for the periodic announcement cycle.
    pub fn sync_jitter(&self) -> Jitter {
        Jitter::Fraction {
            base: self.sync_interval,
            frac: self.sync_interval_jitter,
        }
    }

    /// Jitter for the suppression delay.
    pub fn brief_jitter(&self) -> Jitter {
        Jitter::Fraction {
            base: self.brief_interval,
            frac: self.brief_interval_jitter,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
