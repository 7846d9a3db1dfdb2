//! Signing and verification hooks for data packets.
//!
//! Packets carry a signature type code and a signature value. The sync
//! engine never inspects either; it only asks a [`Signer`] to produce them
//! and a [`Verifier`] to accept or reject them.

use std::fmt;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

use crate::error::{CoreError, Result};

/// Signature type codes carried in `SignatureInfo`.
pub mod signature_type {
    /// Ed25519 over the signed portion of the packet.
    pub const ED25519: u64 = 5;
    /// Unkeyed Blake3 digest of the signed portion. Detects corruption only.
    pub const DIGEST_BLAKE3: u64 = 0xC8;
}

/// Produces signatures for outgoing packets.
pub trait Signer: Send + Sync {
    /// Code written into the packet's `SignatureType`.
    fn signature_type(&self) -> u64;

    /// Sign `message`, returning the raw signature value.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// Checks signatures on incoming packets.
pub trait Verifier: Send + Sync {
    fn verify(&self, signature_type: u64, message: &[u8], signature: &[u8]) -> Result<()>;
}

/// Blake3 digest signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestSigner;

impl Signer for DigestSigner {
    fn signature_type(&self) -> u64 {
        signature_type::DIGEST_BLAKE3
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        blake3::hash(message).as_bytes().to_vec()
    }
}

/// Ed25519 signer backed by a local signing key.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// A verifier that accepts this signer's signatures.
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier {
            key: self.signing_key.verifying_key(),
        }
    }
}

impl Signer for Ed25519Signer {
    fn signature_type(&self) -> u64 {
        signature_type::ED25519
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signer({})", &hex::encode(self.public_key())[..16])
    }
}

/// Accepts every packet. Sync input is trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Verifier for AcceptAll {
    fn verify(&self, _signature_type: u64, _message: &[u8], _signature: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Verifies Blake3 digest signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestVerifier;

impl Verifier for DigestVerifier {
    fn verify(&self, signature_type: u64, message: &[u8], signature: &[u8]) -> Result<()> {
        if signature_type != signature_type::DIGEST_BLAKE3 {
            return Err(CoreError::UnsupportedSignatureType(signature_type));
        }
        if blake3::hash(message).as_bytes() != signature {
            return Err(CoreError::InvalidSignature);
        }
        Ok(())
    }
}

/// Verifies Ed25519 signatures against one public key.
#[derive(Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn from_public_key(bytes: &[u8; 32]) -> Result<Self> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self { key })
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(&self, signature_type: u64, message: &[u8], signature: &[u8]) -> Result<()> {
        if signature_type != signature_type::ED25519 {
            return Err(CoreError::UnsupportedSignatureType(signature_type));
        }
        let bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| CoreError::InvalidSignature)?;
        self.key
            .verify(message, &Signature::from_bytes(&bytes))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Verifier({})", &hex::encode(self.key.to_bytes())[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_sign_verify() {
        let sig = DigestSigner.sign(b"payload");
        assert_eq!(sig.len(), 32);
        DigestVerifier
            .verify(signature_type::DIGEST_BLAKE3, b"payload", &sig)
            .unwrap();
        assert_eq!(
            DigestVerifier.verify(signature_type::DIGEST_BLAKE3, b"tampered", &sig),
            Err(CoreError::InvalidSignature)
        );
    }

    #[test]
    fn test_ed25519_sign_verify() {
        let signer = Ed25519Signer::from_seed(&[0x42; 32]);
        let sig = signer.sign(b"hello");
        let verifier = Ed25519Verifier::from_public_key(&signer.public_key()).unwrap();
        verifier.verify(signature_type::ED25519, b"hello", &sig).unwrap();
        assert!(verifier.verify(signature_type::ED25519, b"hellO", &sig).is_err());
        assert!(verifier.verify(signature_type::ED25519, b"hello", &sig[..10]).is_err());
        assert_eq!(
            verifier.verify(signature_type::DIGEST_BLAKE3, b"hello", &sig),
            Err(CoreError::UnsupportedSignatureType(signature_type::DIGEST_BLAKE3))
        );
    }

    #[test]
    fn test_ed25519_deterministic_from_seed() {
        let a = Ed25519Signer::from_seed(&[7; 32]);
        let b = Ed25519Signer::from_seed(&[7; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"m"), b.sign(b"m"));
        assert_ne!(Ed25519Signer::generate().public_key(), a.public_key());
    }

    #[test]
    fn test_accept_all() {
        AcceptAll.verify(999, b"", b"").unwrap();
    }
}
