//! Recipients of HTLCs, e.g. `identity::Ethereum` or `identity::BitShares`.

use crate::ledger::Chain;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use tiny_keccak::{Hasher, Keccak};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ethereum([u8; 20]);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EthereumParseError {
    #[error("address must be 20 bytes of hex")]
    InvalidHex,
    #[error("mixed-case address fails its EIP-55 checksum")]
    InvalidChecksum,
}

impl Ethereum {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case checksum encoding, without the `0x` prefix.
    fn checksummed(&self) -> String {
        let lower = hex::encode(self.0);

        let mut hasher = Keccak::v256();
        hasher.update(lower.as_bytes());
        let mut digest = [0u8; 32];
        hasher.finalize(&mut digest);

        lower
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let nibble = (digest[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
                if c.is_ascii_alphabetic() && nibble >= 8 {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            })
            .collect()
    }
}

impl FromStr for Ethereum {
    type Err = EthereumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 40 {
            return Err(EthereumParseError::InvalidHex);
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| EthereumParseError::InvalidHex)?;
        let address = Ethereum(bytes);

        let is_mixed_case = digits.chars().any(|c| c.is_ascii_lowercase())
            && digits.chars().any(|c| c.is_ascii_uppercase());
        if is_mixed_case && address.checksummed() != digits {
            return Err(EthereumParseError::InvalidChecksum);
        }

        Ok(address)
    }
}

impl fmt::Display for Ethereum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.checksummed())
    }
}

impl fmt::Debug for Ethereum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ethereum({})", self)
    }
}

/// A BitShares account name such as `init0` or `alice.swap`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitShares(String);

const MIN_ACCOUNT_NAME_LENGTH: usize = 3;
const MAX_ACCOUNT_NAME_LENGTH: usize = 63;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a valid BitShares account name")]
pub struct BitSharesParseError(String);

impl BitShares {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_label(label: &str) -> bool {
        let mut chars = label.chars();
        let first = chars.next();
        let last = label.chars().last();

        matches!(first, Some(c) if c.is_ascii_lowercase())
            && matches!(last, Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit())
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

impl FromStr for BitShares {
    type Err = BitSharesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len_ok = (MIN_ACCOUNT_NAME_LENGTH..=MAX_ACCOUNT_NAME_LENGTH).contains(&s.len());

        if !len_ok || !s.split('.').all(BitShares::is_valid_label) {
            return Err(BitSharesParseError(s.to_owned()));
        }

        Ok(BitShares(s.to_owned()))
    }
}

impl fmt::Display for BitShares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who an HTLC pays out to on redeem.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Ethereum(Ethereum),
    BitShares(BitShares),
}

impl Identity {
    pub fn chain(&self) -> Chain {
        match self {
            Identity::Ethereum(_) => Chain::Ethereum,
            Identity::BitShares(_) => Chain::BitShares,
        }
    }

    /// Parses `s` as an identity on `chain`.
    pub fn parse(chain: Chain, s: &str) -> anyhow::Result<Self> {
        Ok(match chain {
            Chain::Ethereum => Identity::Ethereum(s.parse()?),
            Chain::BitShares => Identity::BitShares(s.parse()?),
        })
    }
}

impl From<Ethereum> for Identity {
    fn from(address: Ethereum) -> Self {
        Identity::Ethereum(address)
    }
}

impl From<BitShares> for Identity {
    fn from(account: BitShares) -> Self {
        Identity::BitShares(account)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Ethereum(address) => address.fmt(f),
            Identity::BitShares(account) => account.fmt(f),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedIdentity {
    chain: Chain,
    address: String,
}

impl Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        TaggedIdentity {
            chain: self.chain(),
            address: self.to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tagged = TaggedIdentity::deserialize(deserializer)?;
        Identity::parse(tagged.chain, &tagged.address).map_err(de::Error::custom)
    }
}
