//! Cryptographic primitives: hashing, secp256k1 keys and signature verification

pub mod keys;
pub mod signatures;
pub mod hash;

pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use signatures::{Secp256k1Verifier, Signature, SignatureVerifier};
pub use hash::{Hash160, Hash256};
