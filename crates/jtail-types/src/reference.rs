use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Multihash code for BLAKE3.
const BLAKE3_CODE: u8 = 0x1e;
/// Digest length carried in the multihash header.
const DIGEST_LEN: u8 = 32;

/// Content address of an immutable object (a block, a canonical record, a
/// chain cell).
///
/// The bytes are opaque to the follower; the only structure it relies on is
/// equality. At every external boundary a `ContentRef` travels as a base58
/// string, and that is also its serde representation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentRef(Vec<u8>);

impl ContentRef {
    /// Wrap raw address bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Address `data` by its multihash-framed BLAKE3 digest.
    pub fn digest(data: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(2 + DIGEST_LEN as usize);
        bytes.push(BLAKE3_CODE);
        bytes.push(DIGEST_LEN);
        bytes.extend_from_slice(blake3::hash(data).as_bytes());
        Self(bytes)
    }

    /// Parse the base58 text form.
    pub fn from_base58(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::InvalidBase58("empty reference".into()));
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| TypeError::InvalidBase58(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Base58 text form.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Short hex representation for logs: the first 4 digest bytes, past
    /// the multihash header when there is one.
    pub fn short_hex(&self) -> String {
        let digest = self
            .0
            .strip_prefix(&[BLAKE3_CODE, DIGEST_LEN][..])
            .unwrap_or(&self.0);
        let end = digest.len().min(4);
        hex::encode(&digest[..end])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentRef({})", self.to_base58())
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl FromStr for ContentRef {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl AsRef<[u8]> for ContentRef {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ContentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for ContentRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}
