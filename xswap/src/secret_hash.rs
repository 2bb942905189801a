use crate::secret::Secret;
use bitcoin_hashes::{hash160, ripemd160, sha256, Hash};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Digest used to commit to a [`Secret`].
///
/// Both ledgers must be able to check the preimage against the digest, see
/// [`crate::Chain::supports`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Ripemd160,
    /// ripemd160(sha256(x))
    Hash160,
}

impl HashAlgorithm {
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Ripemd160 | HashAlgorithm::Hash160 => 20,
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha256::Hash::hash(data).to_byte_array().to_vec(),
            HashAlgorithm::Ripemd160 => ripemd160::Hash::hash(data).to_byte_array().to_vec(),
            HashAlgorithm::Hash160 => hash160::Hash::hash(data).to_byte_array().to_vec(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretHash {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl SecretHash {
    pub fn new(algorithm: HashAlgorithm, secret: &Secret) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(secret.as_raw_secret()),
        }
    }

    pub fn from_digest(
        algorithm: HashAlgorithm,
        digest: Vec<u8>,
    ) -> Result<Self, SecretHashParseError> {
        if digest.len() != algorithm.digest_len() {
            return Err(SecretHashParseError::InvalidLength {
                algorithm,
                expected: algorithm.digest_len(),
                got: digest.len(),
            });
        }

        Ok(Self { algorithm, digest })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.digest
    }

    /// Whether `secret` is the preimage of this hash.
    pub fn matches(&self, secret: &Secret) -> bool {
        self.algorithm.digest(secret.as_raw_secret()) == self.digest
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHash({})", self)
    }
}

impl fmt::LowerHex for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hex::encode(&self.digest).as_str())
    }
}

impl fmt::Display for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:x}", self.algorithm, self)
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SecretHashParseError {
    #[error("expected <algorithm>:<hex digest>")]
    MissingAlgorithm,
    #[error("unknown hash algorithm")]
    UnknownAlgorithm(#[from] strum::ParseError),
    #[error("digest is not valid hex")]
    FromHex(#[from] hex::FromHexError),
    #[error("{algorithm} digest must be {expected} bytes but got {got}")]
    InvalidLength {
        algorithm: HashAlgorithm,
        expected: usize,
        got: usize,
    },
}

impl FromStr for SecretHash {
    type Err = SecretHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        let (algorithm, digest) = match (parts.next(), parts.next()) {
            (Some(algorithm), Some(digest)) => (algorithm, digest),
            _ => return Err(SecretHashParseError::MissingAlgorithm),
        };
        let algorithm = HashAlgorithm::from_str(algorithm)?;
        let digest = hex::decode(digest.trim_start_matches("0x"))?;

        Self::from_digest(algorithm, digest)
    }
}

impl Serialize for SecretHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SecretHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SecretHash::from_str(&s).map_err(de::Error::custom)
    }
}
