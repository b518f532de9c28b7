use ed25519_dalek::{self, Signer, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;

/// Callers are identified by the SHA-256 of their ed25519 public key.
pub type Address = [u8; 32];
pub type PublicKey = ed25519_dalek::PublicKey;
pub type SecretKey = ed25519_dalek::SecretKey;
pub type Signature = ed25519_dalek::Signature;

pub fn address(pk: &PublicKey) -> Address {
    Sha256::digest(pk.as_bytes()).into()
}

/// Hex serde for optional addresses, matching `hex::serde` on plain ones.
pub mod opt_hex {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::Address;

    pub fn serialize<S: Serializer>(
        address: &Option<Address>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match address {
            Some(address) => serializer.serialize_some(&hex::encode(address)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Address>, D::Error> {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let mut address = [0u8; 32];
        hex::decode_to_slice(text, &mut address).map_err(D::Error::custom)?;
        Ok(Some(address))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Keypair {
    pub kp: ed25519_dalek::Keypair,
}

impl Keypair {
    pub fn gen() -> Self {
        let mut csprng = OsRng {};
        Self { kp: ed25519_dalek::Keypair::generate(&mut csprng) }
    }

    /// Deterministic keypair, used for fixtures and configured operator keys.
    pub fn from_secret(bytes: &[u8; 32]) -> Result<Self, ed25519_dalek::SignatureError> {
        let secret = SecretKey::from_bytes(bytes)?;
        let public: PublicKey = (&secret).into();
        Ok(Self { kp: ed25519_dalek::Keypair { secret, public } })
    }

    pub fn public(&self) -> PublicKey {
        self.kp.public
    }

    pub fn address(&self) -> Address {
        address(&self.kp.public)
    }

    pub fn sign<T: Serialize>(&self, msg: &T) -> Signature {
        // Serializing plain data structs into json cannot fail.
        let bytes = serde_json::to_vec(msg).unwrap_or_default();
        self.kp.sign(&bytes)
    }

    pub fn signed<T: Serialize>(&self, msg: T) -> Signed<T> {
        let sig = self.sign(&msg);
        Signed { msg, from: self.kp.public, sig }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signed<T> {
    pub msg: T,
    pub from: PublicKey,
    pub sig: Signature,
}

impl<T: Serialize> Signed<T> {
    pub fn verify(&self) -> bool {
        match serde_json::to_vec(&self.msg) {
            Ok(bytes) => self.from.verify(&bytes, &self.sig).is_ok(),
            Err(_) => false,
        }
    }

    pub fn signer(&self) -> Address {
        address(&self.from)
    }
}
