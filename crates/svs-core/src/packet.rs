//! Data packets: the named, signed content items that sync fetches.
//!
//! ```text
//! Data            ::= TYPE(0x06) LENGTH Name MetaInfo? Content? SignatureInfo SignatureValue
//! MetaInfo        ::= TYPE(0x14) LENGTH ContentType? FreshnessPeriod?
//! SignatureInfo   ::= TYPE(0x16) LENGTH SignatureType
//! ```
//!
//! The signature covers the encoded `Name`, `MetaInfo`, `Content` and
//! `SignatureInfo` elements, in that order.

use std::time::Duration;

use bytes::Bytes;

use crate::crypto::{Signer, Verifier};
use crate::error::{CoreError, Result};
use crate::name::Name;
use crate::tlv::{self, types, TlvReader};

/// Content type codes.
pub mod content_type {
    pub const BLOB: u64 = 0;
}

/// A decoded data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    name: Name,
    content_type: u64,
    freshness: Option<Duration>,
    content: Bytes,
    signature_type: u64,
    signature_value: Bytes,
}

impl DataPacket {
    /// An unsigned blob packet.
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content_type: content_type::BLOB,
            freshness: None,
            content: content.into(),
            signature_type: 0,
            signature_value: Bytes::new(),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub fn with_content_type(mut self, content_type: u64) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sign the packet, replacing any previous signature.
    pub fn sign(mut self, signer: &dyn Signer) -> Self {
        self.signature_type = signer.signature_type();
        let signed = self.signed_portion();
        self.signature_value = Bytes::from(signer.sign(&signed));
        self
    }

    pub fn verify(&self, verifier: &dyn Verifier) -> Result<()> {
        verifier.verify(self.signature_type, &self.signed_portion(), &self.signature_value)
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn content_type(&self) -> u64 {
        self.content_type
    }

    pub fn freshness(&self) -> Option<Duration> {
        self.freshness
    }

    pub fn signature_type(&self) -> u64 {
        self.signature_type
    }

    pub fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }

    fn meta_info(&self) -> Vec<u8> {
        let mut meta = Vec::new();
        let mut value = Vec::new();
        tlv::write_nonneg(&mut value, self.content_type);
        tlv::write_tlv(&mut meta, types::CONTENT_TYPE, &value);
        if let Some(freshness) = self.freshness {
            value.clear();
            let millis = u64::try_from(freshness.as_millis()).unwrap_or(u64::MAX);
            tlv::write_nonneg(&mut value, millis);
            tlv::write_tlv(&mut meta, types::FRESHNESS_PERIOD, &value);
        }
        meta
    }

    /// The bytes covered by the signature.
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.encoded_len() + self.content.len() + 32);
        self.name.encode_into(&mut buf);
        tlv::write_tlv(&mut buf, types::META_INFO, &self.meta_info());
        tlv::write_tlv(&mut buf, types::CONTENT, &self.content);
        let mut sig_type = Vec::new();
        tlv::write_nonneg(&mut sig_type, self.signature_type);
        let mut sig_info = Vec::new();
        tlv::write_tlv(&mut sig_info, types::SIGNATURE_TYPE, &sig_type);
        tlv::write_tlv(&mut buf, types::SIGNATURE_INFO, &sig_info);
        buf
    }

    /// Full wire encoding.
    pub fn encode(&self) -> Bytes {
        let mut value = self.signed_portion();
        tlv::write_tlv(&mut value, types::SIGNATURE_VALUE, &self.signature_value);
        let mut buf = Vec::with_capacity(tlv::tlv_len(types::DATA, value.len()));
        tlv::write_tlv(&mut buf, types::DATA, &value);
        Bytes::from(buf)
    }

    /// Decode a complete Data TLV.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let value = tlv::expect_tlv(bytes, &mut pos, types::DATA)?;
        if pos != bytes.len() {
            return Err(CoreError::TrailingBytes(bytes.len() - pos));
        }

        let mut name = None;
        let mut packet = Self::new(Name::new(), Bytes::new());
        let mut saw_signature_info = false;
        let mut saw_signature_value = false;

        for item in TlvReader::new(value) {
            let (typ, field) = item?;
            match typ {
                types::NAME => name = Some(Name::decode_value(field)?),
                types::META_INFO => {
                    for meta in TlvReader::new(field) {
                        let (meta_typ, meta_value) = meta?;
                        match meta_typ {
                            types::CONTENT_TYPE => packet.content_type = tlv::read_nonneg(meta_value)?,
                            types::FRESHNESS_PERIOD => {
                                packet.freshness =
                                    Some(Duration::from_millis(tlv::read_nonneg(meta_value)?))
                            }
                            _ => {}
                        }
                    }
                }
                types::CONTENT => packet.content = Bytes::copy_from_slice(field),
                types::SIGNATURE_INFO => {
                    let mut info_pos = 0;
                    let sig_type = tlv::expect_tlv(field, &mut info_pos, types::SIGNATURE_TYPE)?;
                    packet.signature_type = tlv::read_nonneg(sig_type)?;
                    saw_signature_info = true;
                }
                types::SIGNATURE_VALUE => {
                    packet.signature_value = Bytes::copy_from_slice(field);
                    saw_signature_value = true;
                }
                other => {
                    return Err(CoreError::MalformedPacket(format!(
                        "unexpected element {:#x}",
                        other
                    )))
                }
            }
        }

        packet.name = name.ok_or_else(|| CoreError::MalformedPacket("missing name".into()))?;
        if !saw_signature_info || !saw_signature_value {
            return Err(CoreError::MalformedPacket("missing signature".into()));
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{signature_type, AcceptAll, DigestSigner, DigestVerifier, Ed25519Signer};
    use crate::name::Component;

    fn data_name() -> Name {
        "/group/data/node-a".parse::<Name>().unwrap().with(Component::sequence_number(3))
    }

    #[test]
    fn test_encode_decode_digest_signed() {
        let packet = DataPacket::new(data_name(), &b"hello"[..])
            .with_freshness(Duration::from_secs(5))
            .sign(&DigestSigner);
        let wire = packet.encode();
        assert_eq!(wire[0], 0x06);

        let decoded = DataPacket::decode(&wire).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.content().as_ref(), b"hello");
        assert_eq!(decoded.freshness(), Some(Duration::from_secs(5)));
        assert_eq!(decoded.signature_type(), signature_type::DIGEST_BLAKE3);
        decoded.verify(&DigestVerifier).unwrap();
    }

    #[test]
    fn test_tampered_content_fails_verification() {
        let packet = DataPacket::new(data_name(), &b"hello"[..]).sign(&DigestSigner);
        let mut wire = packet.encode().to_vec();
        let last_content_byte = wire
            .windows(5)
            .position(|w| w == b"hello")
            .unwrap();
        wire[last_content_byte] = b'j';
        let decoded = DataPacket::decode(&wire).unwrap();
        assert!(decoded.verify(&DigestVerifier).is_err());
        decoded.verify(&AcceptAll).unwrap();
    }

    #[test]
    fn test_ed25519_signed_packet() {
        let signer = Ed25519Signer::from_seed(&[1; 32]);
        let packet = DataPacket::new(data_name(), &b"x"[..]).sign(&signer);
        let decoded = DataPacket::decode(&packet.encode()).unwrap();
        decoded.verify(&signer.verifier()).unwrap();
        assert_eq!(decoded.signature_value().len(), 64);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(DataPacket::decode(&[]).is_err());
        assert!(DataPacket::decode(&[0x05, 0x00]).is_err());
        // Data with only a name.
        let mut buf = Vec::new();
        let mut value = Vec::new();
        data_name().encode_into(&mut value);
        tlv::write_tlv(&mut buf, types::DATA, &value);
        assert!(matches!(
            DataPacket::decode(&buf),
            Err(CoreError::MalformedPacket(_))
        ));
    }
}
