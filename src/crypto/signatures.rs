use crate::crypto::hash::{Hash160, Hash256};
use crate::{LedgerError, Result};
use secp256k1::{ecdsa::Signature as Secp256k1Signature, Message, PublicKey, Secp256k1, VerifyOnly};

/// Compact (64-byte r||s) ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(Secp256k1Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(LedgerError::Crypto("Invalid signature length".to_string()));
        }

        Secp256k1Signature::from_compact(bytes)
            .map(Self)
            .map_err(|e| LedgerError::Crypto(format!("Invalid signature: {}", e)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.serialize_compact().to_vec()
    }

    pub fn from_secp256k1(signature: Secp256k1Signature) -> Self {
        Self(signature)
    }

    pub fn as_secp256k1(&self) -> &Secp256k1Signature {
        &self.0
    }
}

/// The ledger's view of the signing identity provider.
pub trait SignatureVerifier: Send + Sync {
    /// `true` iff `signature` over `message` was produced by `public_key`.
    fn verify(&self, public_key: &[u8], message: &Hash256, signature: &[u8]) -> bool;

    /// Owner hash that outputs paying `public_key` are locked to.
    fn owner_hash(&self, public_key: &[u8]) -> Vec<u8>;
}

pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, public_key: &[u8], message: &Hash256, signature: &[u8]) -> bool {
        let Ok(public_key) = PublicKey::from_slice(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_bytes(signature) else {
            return false;
        };
        let Ok(message) = Message::from_digest_slice(message.as_bytes()) else {
            return false;
        };

        self.secp
            .verify_ecdsa(&message, signature.as_secp256k1(), &public_key)
            .is_ok()
    }

    fn owner_hash(&self, public_key: &[u8]) -> Vec<u8> {
        Hash160::hash_sha256(public_key).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::PrivateKey;

    #[test]
    fn test_signature_roundtrip() -> Result<()> {
        let private_key = PrivateKey::new()?;
        let public_key = private_key.public_key();
        let message = Hash256::hash(b"test message");

        let signature = private_key.sign(&message)?;
        assert!(public_key.verify(&message, &signature)?);

        let restored = Signature::from_bytes(&signature.to_bytes())?;
        assert_eq!(signature, restored);
        Ok(())
    }

    #[test]
    fn test_verifier_rejects_wrong_message_and_key() -> Result<()> {
        let verifier = Secp256k1Verifier::new();
        let signer = PrivateKey::new()?;
        let other = PrivateKey::new()?;
        let message = Hash256::hash(b"spend");
        let signature = signer.sign(&message)?.to_bytes();

        assert!(verifier.verify(signer.public_key().to_bytes(), &message, &signature));
        assert!(!verifier.verify(signer.public_key().to_bytes(), &Hash256::hash(b"other"), &signature));
        assert!(!verifier.verify(other.public_key().to_bytes(), &message, &signature));
        assert!(!verifier.verify(b"garbage", &message, &signature));
        assert!(!verifier.verify(signer.public_key().to_bytes(), &message, &[]));
        Ok(())
    }

    #[test]
    fn test_verifier_owner_hash_matches_key_owner_hash() -> Result<()> {
        let key = PrivateKey::new()?.public_key();
        let verifier = Secp256k1Verifier::new();
        assert_eq!(verifier.owner_hash(key.to_bytes()), key.owner_hash().to_vec());
        Ok(())
    }
}
