use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::signatures::Signature;
use crate::{LedgerError, Result};
use rand::{rngs::OsRng, RngCore};
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;

const ADDRESS_VERSION: u8 = 0x00;
const WIF_VERSION: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key: Vec<u8>, // Compressed SEC1 encoding
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl PrivateKey {
    pub fn new() -> Result<Self> {
        let mut secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_bytes);

        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| LedgerError::Crypto(format!("Failed to create private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(LedgerError::Crypto("Private key must be 32 bytes".to_string()));
        }

        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn from_wif(wif: &str) -> Result<Self> {
        let decoded = bs58::decode(wif)
            .into_vec()
            .map_err(|e| LedgerError::Crypto(format!("Invalid WIF format: {}", e)))?;

        if decoded.len() != 37 || decoded[0] != WIF_VERSION {
            return Err(LedgerError::Crypto("Invalid WIF format".to_string()));
        }

        let (data, checksum) = decoded.split_at(33);
        if &Hash256::double_hash(data).as_bytes()[0..4] != checksum {
            return Err(LedgerError::Crypto("Invalid WIF checksum".to_string()));
        }

        Self::from_bytes(&data[1..])
    }

    pub fn to_wif(&self) -> String {
        let mut data = Vec::with_capacity(37);
        data.push(WIF_VERSION);
        data.extend_from_slice(&self.key.secret_bytes());

        let hash = Hash256::double_hash(&data);
        data.extend_from_slice(&hash.as_bytes()[0..4]);

        bs58::encode(data).into_string()
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        let public_key = Secp256k1PublicKey::from_secret_key(&secp, &self.key);

        PublicKey {
            key: public_key.serialize().to_vec(),
        }
    }

    pub fn sign(&self, message: &Hash256) -> Result<Signature> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest_slice(message.as_bytes())
            .map_err(|e| LedgerError::Crypto(format!("Invalid message: {}", e)))?;

        Ok(Signature::from_secp256k1(secp.sign_ecdsa(&message, &self.key)))
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Secp256k1PublicKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            key: bytes.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn owner_hash(&self) -> Hash160 {
        Hash160::hash_sha256(&self.key)
    }

    pub fn to_address(&self) -> String {
        encode_address(&self.owner_hash())
    }

    pub fn verify(&self, message: &Hash256, signature: &Signature) -> Result<bool> {
        let secp = Secp256k1::verification_only();

        let public_key = Secp256k1PublicKey::from_slice(&self.key)
            .map_err(|e| LedgerError::Crypto(format!("Invalid public key: {}", e)))?;

        let message = Message::from_digest_slice(message.as_bytes())
            .map_err(|e| LedgerError::Crypto(format!("Invalid message: {}", e)))?;

        Ok(secp
            .verify_ecdsa(&message, signature.as_secp256k1(), &public_key)
            .is_ok())
    }
}

impl KeyPair {
    pub fn new() -> Result<Self> {
        Ok(Self::from_private_key(PrivateKey::new()?))
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }

    pub fn owner_hash(&self) -> Hash160 {
        self.public_key.owner_hash()
    }

    pub fn address(&self) -> String {
        self.public_key.to_address()
    }
}

/// Base58check of `version || owner_hash`. Display only; the ledger keys
/// everything by the raw owner hash.
pub fn encode_address(owner_hash: &Hash160) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(owner_hash.as_bytes());

    let hash = Hash256::double_hash(&data);
    data.extend_from_slice(&hash.as_bytes()[0..4]);

    bs58::encode(data).into_string()
}

pub fn decode_address(address: &str) -> Result<Hash160> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| LedgerError::InvalidInput(format!("Invalid address encoding: {}", e)))?;

    if decoded.len() != 25 || decoded[0] != ADDRESS_VERSION {
        return Err(LedgerError::InvalidInput(format!("Invalid address: {}", address)));
    }

    let (payload, checksum) = decoded.split_at(21);
    if &Hash256::double_hash(payload).as_bytes()[0..4] != checksum {
        return Err(LedgerError::InvalidInput("Invalid address checksum".to_string()));
    }

    Hash160::from_slice(&payload[1..])
        .ok_or_else(|| LedgerError::InvalidInput("Invalid address payload".to_string()))
}

/// Accepts either a 40-character hex owner hash or a base58 address.
pub fn parse_owner(owner: &str) -> Result<Hash160> {
    if owner.len() == 40 {
        if let Ok(bytes) = hex::decode(owner) {
            if let Some(hash) = Hash160::from_slice(&bytes) {
                return Ok(hash);
            }
        }
    }
    decode_address(owner)
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wif_roundtrip() -> Result<()> {
        let key = PrivateKey::new()?;
        let restored = PrivateKey::from_wif(&key.to_wif())?;
        assert_eq!(key.public_key(), restored.public_key());
        Ok(())
    }

    #[test]
    fn test_wif_rejects_bad_checksum() -> Result<()> {
        let wif = PrivateKey::new()?.to_wif();
        let mut chars: Vec<char> = wif.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '1' { '2' } else { '1' };
        let tampered: String = chars.into_iter().collect();

        assert!(PrivateKey::from_wif(&tampered).is_err());
        Ok(())
    }

    #[test]
    fn test_address_decodes_to_owner_hash() -> Result<()> {
        let pair = KeyPair::new()?;
        let address = pair.address();

        assert_eq!(decode_address(&address)?, pair.owner_hash());
        assert!(decode_address("not-an-address").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_owner_accepts_hex_and_address() -> Result<()> {
        let pair = KeyPair::new()?;
        let owner = pair.owner_hash();

        assert_eq!(parse_owner(&owner.to_hex())?, owner);
        assert_eq!(parse_owner(&pair.address())?, owner);
        Ok(())
    }
}
