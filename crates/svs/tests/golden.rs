//! Golden test vectors for cross-implementation verification.
//!
//! Every SVS implementation must produce identical:
//! - state vector bytes, formal and informal
//! - data packet bytes for a given name, content and signer
//! - signed portion (what the signature covers)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use svs::core::{
    DataPacket, DigestSigner, DigestVerifier, Ed25519Signer, Name, Signer, StateVector,
    VectorFormat, VectorOrdering,
};
use svs::sync::{DataNaming, NamingScheme};
use svs_testkit::vectors::{all_vectors, golden_packet, DATA_PACKET_HEX};

/// A single packet golden vector.
#[derive(Debug, Serialize, Deserialize)]
pub struct PacketVector {
    pub name: String,
    pub description: String,

    // Inputs
    pub data_name: String,
    pub content: String, // hex
    pub freshness_ms: u64,
    pub signer: String, // "digest" or "ed25519:<seed hex>"

    // Derived outputs (hex)
    pub signed_portion: String,
    pub signature: String,
    pub packet: String,
}

fn signer_for(descriptor: &str) -> Box<dyn Signer> {
    match descriptor.strip_prefix("ed25519:") {
        Some(seed) => {
            let seed: [u8; 32] = hex::decode(seed).unwrap().try_into().unwrap();
            Box::new(Ed25519Signer::from_seed(&seed))
        }
        None => Box::new(DigestSigner),
    }
}

fn generate_vector(
    name: &str,
    description: &str,
    data_name: Name,
    content: &[u8],
    freshness_ms: u64,
    signer: &str,
) -> PacketVector {
    let packet = DataPacket::new(data_name.clone(), content.to_vec())
        .with_freshness(Duration::from_millis(freshness_ms))
        .sign(signer_for(signer).as_ref());

    PacketVector {
        name: name.to_string(),
        description: description.to_string(),
        data_name: data_name.to_string(),
        content: hex::encode(content),
        freshness_ms,
        signer: signer.to_string(),
        signed_portion: hex::encode(packet.signed_portion()),
        signature: hex::encode(packet.signature_value()),
        packet: hex::encode(packet.encode()),
    }
}

fn group_naming() -> DataNaming {
    DataNaming::new("/ndn/chat".parse().unwrap(), NamingScheme::GroupOriented)
}

pub fn generate_all_vectors() -> Vec<PacketVector> {
    let naming = group_naming();
    let alice: Name = "/alice".parse().unwrap();
    vec![
        generate_vector(
            "digest_small",
            "Short text content, Blake3 digest signature",
            naming.data_name(&alice, 1),
            b"hello",
            5000,
            "digest",
        ),
        generate_vector(
            "digest_empty",
            "Empty content",
            naming.data_name(&alice, 2),
            &[],
            5000,
            "digest",
        ),
        generate_vector(
            "digest_binary",
            "Content containing all 256 byte values",
            naming.data_name(&alice, 300),
            &(0u8..=255).collect::<Vec<u8>>(),
            5000,
            "digest",
        ),
        generate_vector(
            "ed25519_small",
            "Short text content, deterministic Ed25519 signature",
            naming.data_name(&alice, 1),
            b"hello",
            5000,
            &format!("ed25519:{}", hex::encode([0x42u8; 32])),
        ),
        generate_vector(
            "source_oriented",
            "Source-oriented naming with a long-lived packet",
            DataNaming::new("/ndn/chat".parse().unwrap(), NamingScheme::SourceOriented)
                .data_name(&alice, 7),
            b"{\"msg\":\"hi\"}",
            3_600_000,
            "digest",
        ),
    ]
}

#[test]
fn test_state_vector_vectors() {
    for v in all_vectors() {
        assert!(v.verify(), "state vector mismatch for {}", v.name);
    }
}

#[test]
fn test_informal_decodes_like_formal() {
    let formal = hex::decode(all_vectors()[0].expected_hex).unwrap();
    let informal = hex::decode(all_vectors()[1].expected_hex).unwrap();
    let a = StateVector::decode(&formal, VectorFormat::Formal, VectorOrdering::Canonical).unwrap();
    let b =
        StateVector::decode(&informal, VectorFormat::Informal, VectorOrdering::Canonical).unwrap();
    assert_eq!(a.encode(VectorFormat::Formal), b.encode(VectorFormat::Formal));
}

#[test]
fn test_golden_packet_reencodes() {
    let packet = golden_packet().unwrap();
    assert_eq!(hex::encode(packet.encode()), DATA_PACKET_HEX);
}

#[test]
fn test_vectors_deterministic() {
    let v1 = generate_all_vectors();
    let v2 = generate_all_vectors();

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert_eq!(a.signed_portion, b.signed_portion, "signed_portion mismatch for {}", a.name);
        assert_eq!(a.signature, b.signature, "signature mismatch for {}", a.name);
        assert_eq!(a.packet, b.packet, "packet mismatch for {}", a.name);
    }
}

#[test]
fn test_vectors_decode_and_verify() {
    for v in &generate_all_vectors() {
        let bytes = hex::decode(&v.packet).unwrap();
        let packet = DataPacket::decode(&bytes).unwrap();

        assert_eq!(packet.name().to_string(), v.data_name, "name mismatch for {}", v.name);
        assert_eq!(hex::encode(packet.content()), v.content, "content mismatch for {}", v.name);
        assert_eq!(
            packet.freshness(),
            Some(Duration::from_millis(v.freshness_ms)),
            "freshness mismatch for {}",
            v.name
        );
        assert_eq!(hex::encode(packet.signed_portion()), v.signed_portion);

        match v.signer.strip_prefix("ed25519:") {
            Some(seed) => {
                let seed: [u8; 32] = hex::decode(seed).unwrap().try_into().unwrap();
                let verifier = Ed25519Signer::from_seed(&seed).verifier();
                assert!(packet.verify(&verifier).is_ok(), "verify failed for {}", v.name);
            }
            None => {
                assert!(packet.verify(&DigestVerifier).is_ok(), "verify failed for {}", v.name);
            }
        }
    }
}

#[test]
fn test_tampered_packet_fails_verification() {
    let v = &generate_all_vectors()[0];
    let mut bytes = hex::decode(&v.packet).unwrap();
    // Corrupt the signature value, the final element.
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let packet = DataPacket::decode(&bytes).unwrap();
    assert!(packet.verify(&DigestVerifier).is_err());
}

#[test]
fn print_golden_vectors_json() {
    #[derive(Serialize)]
    struct VectorFile {
        version: String,
        description: String,
        vectors: Vec<PacketVector>,
    }

    let file = VectorFile {
        version: "0.1.0".to_string(),
        description: "Data packet golden vectors. Every implementation must produce identical outputs."
            .to_string(),
        vectors: generate_all_vectors(),
    };
    let json = serde_json::to_string_pretty(&file).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["vectors"].as_array().unwrap().len(), 5);
    println!("{}", json);
}
