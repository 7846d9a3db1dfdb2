//! Golden test vectors for wire compatibility.
//!
//! These vectors pin the exact bytes other SVS implementations produce, so
//! any change to the codec that breaks interoperability fails loudly.

use svs_core::{DataPacket, Name, StateVector, VectorFormat, VectorOrdering};

/// A state vector and its expected encoding.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Source names and sequence numbers, in insertion order.
    pub entries: &'static [(&'static str, u64)],
    pub format: VectorFormat,
    /// Expected full TLV encoding (hex).
    pub expected_hex: &'static str,
}

impl GoldenVector {
    /// Build the vector in canonical order.
    pub fn build(&self) -> StateVector {
        let mut vector = StateVector::new();
        for (source, seq) in self.entries {
            // Entries are static test data.
            if let Ok(name) = source.parse::<Name>() {
                vector.set_name(&name, *seq, false);
            }
        }
        vector
    }

    pub fn expected_bytes(&self) -> Vec<u8> {
        hex::decode(self.expected_hex).unwrap_or_default()
    }

    /// Whether encoding matches and the expected bytes decode back.
    pub fn verify(&self) -> bool {
        let vector = self.build();
        let expected = self.expected_bytes();
        if vector.encode(self.format) != expected {
            return false;
        }
        match StateVector::decode(&expected, self.format, VectorOrdering::Canonical) {
            Ok(decoded) => self
                .entries
                .iter()
                .all(|(source, seq)| decoded.get(source) == *seq),
            Err(_) => false,
        }
    }
}

/// Get all state vector golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "two sources, formal",
            entries: &[("/one", 1), ("/two", 2)],
            format: VectorFormat::Formal,
            expected_hex: "c918ca0a070508036f6e65cc0101ca0a0705080374776fcc0102",
        },
        GoldenVector {
            name: "two sources, informal",
            entries: &[("/one", 1), ("/two", 2)],
            format: VectorFormat::Informal,
            expected_hex: "c914070508036f6e65cc01010705080374776fcc0102",
        },
        GoldenVector {
            name: "inserted out of order, formal",
            entries: &[("/two", 2), ("/one", 1)],
            format: VectorFormat::Formal,
            expected_hex: "c918ca0a070508036f6e65cc0101ca0a0705080374776fcc0102",
        },
        GoldenVector {
            name: "empty",
            entries: &[],
            format: VectorFormat::Formal,
            expected_hex: "c900",
        },
        GoldenVector {
            name: "wide sequence numbers, formal",
            entries: &[("/ndn/b", 70000), ("/a", 300)],
            format: VectorFormat::Formal,
            expected_hex: "c91fca0a0703080161cc03fd012cca11070808036e646e080162cc05fe00011170",
        },
        GoldenVector {
            name: "wide sequence numbers, informal",
            entries: &[("/a", 300), ("/ndn/b", 70000)],
            format: VectorFormat::Informal,
            expected_hex: "c91b0703080161cc03fd012c070808036e646e080162cc05fe00011170",
        },
    ]
}

/// A Data packet for `/g/data/a/seq=1` with content `hi`, 5 s freshness
/// and a placeholder Blake3 digest signature.
pub const DATA_PACKET_HEX: &str =
    "0629070f0801670804646174610801613a01011407180100190213881502686916031b01c81704deadbeef";

/// Decode [`DATA_PACKET_HEX`].
pub fn golden_packet() -> Option<DataPacket> {
    let bytes = hex::decode(DATA_PACKET_HEX).ok()?;
    DataPacket::decode(&bytes).ok()
}

/// Check every vector.
pub fn verify_all_vectors() -> Vec<(String, bool)> {
    all_vectors()
        .iter()
        .map(|v| (v.name.to_string(), v.verify()))
        .collect()
}
