use alloy_primitives::Address;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::network::{SignedTransaction, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid private key hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("private key must be 32 bytes (64 hex chars), got {0} bytes")]
    InvalidLength(usize),
    #[error("transaction encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed public key")]
    MalformedKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not match transaction")]
    InvalidSignature,
    #[error("signer {signer} does not match sender {sender}")]
    SenderMismatch { signer: Address, sender: Address },
    #[error("transaction encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Account address of an ed25519 public key: the last 20 bytes of its SHA-256.
pub fn address_of(key: &VerifyingKey) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"ctk-account");
    hasher.update(key.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Address::from_slice(&digest[12..])
}

/// Operator key held in process memory.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn generate() -> Self {
        Self::from_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_key(SigningKey::from_bytes(bytes))
    }

    pub fn from_hex(sk_hex: &str) -> Result<Self, SignerError> {
        let trimmed = sk_hex.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignerError::InvalidLength(bytes.len()))?;
        Ok(Self::from_bytes(&arr))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_of(&key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    pub fn sign(&self, tx: Transaction) -> Result<SignedTransaction, SignerError> {
        let digest = tx.hash()?;
        let signature = self.key.sign(digest.as_slice());
        Ok(SignedTransaction {
            tx,
            public_key: self.public_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Checks the signature over the transaction hash and that the key belongs
/// to the declared sender. Returns the sender.
pub fn verify_transaction(signed: &SignedTransaction) -> Result<Address, SignatureError> {
    let key_bytes: [u8; 32] = signed
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::MalformedKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::MalformedKey)?;
    let signature =
        Signature::from_slice(&signed.signature).map_err(|_| SignatureError::MalformedSignature)?;
    let digest = signed.tx.hash()?;
    key.verify_strict(digest.as_slice(), &signature)
        .map_err(|_| SignatureError::InvalidSignature)?;
    let signer = address_of(&key);
    if signer != signed.tx.from {
        return Err(SignatureError::SenderMismatch {
            signer,
            sender: signed.tx.from,
        });
    }
    Ok(signer)
}

pub(crate) mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
