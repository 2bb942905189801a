use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

pub const SECRET_LENGTH: usize = 32;

/// The preimage of an HTLC.
///
/// `Debug` does not print the bytes, a secret only becomes public by being
/// published on chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret([u8; SECRET_LENGTH]);

impl From<[u8; SECRET_LENGTH]> for Secret {
    fn from(secret: [u8; SECRET_LENGTH]) -> Self {
        Secret(secret)
    }
}

impl Secret {
    pub fn from_vec(vec: &[u8]) -> Result<Secret, SecretFromErr> {
        if vec.len() != SECRET_LENGTH {
            return Err(SecretFromErr::InvalidLength {
                expected: SECRET_LENGTH,
                got: vec.len(),
            });
        }
        let mut data = [0; SECRET_LENGTH];
        data.copy_from_slice(vec);
        Ok(Secret(data))
    }

    pub fn as_raw_secret(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    pub fn into_raw_secret(self) -> [u8; SECRET_LENGTH] {
        self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl fmt::LowerHex for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hex::encode(&self.0).as_str())
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SecretFromErr {
    #[error("invalid secret length, expected {expected} bytes but got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("secret is not valid hex")]
    FromHex(#[from] hex::FromHexError),
}

impl FromStr for Secret {
    type Err = SecretFromErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s.trim_start_matches("0x"))?;
        Self::from_vec(&vec)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = Secret;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<Secret, E>
            where
                E: de::Error,
            {
                Secret::from_str(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"hex encoded bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:x}", self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_secret() {
        let secret = Secret::from(*b"hello world, you are beautiful!!");

        assert_eq!(format!("{:?}", secret), "Secret([REDACTED])");
    }

    #[test]
    fn round_trip_secret_serialization() {
        let secret = Secret::from(*b"hello world, you are beautiful!!");

        let json_secret = serde_json::to_string(&secret).unwrap();
        let deser_secret = serde_json::from_str::<Secret>(json_secret.as_str()).unwrap();

        assert_eq!(
            json_secret,
            "\"68656c6c6f20776f726c642c20796f75206172652062656175746966756c2121\""
        );
        assert_eq!(deser_secret, secret);
    }

    #[test]
    fn accepts_0x_prefix() {
        let secret =
            Secret::from_str("0x68656c6c6f20776f726c642c20796f75206172652062656175746966756c2121")
                .unwrap();

        assert_eq!(secret.as_raw_secret(), b"hello world, you are beautiful!!");
    }

    #[test]
    fn invalid_length_from_str() {
        let result =
            Secret::from_str("68d627971643a6f97f27c58957826fcba853ec2077fd10ec6b93d8e61deb4c");

        assert_eq!(
            result.unwrap_err(),
            SecretFromErr::InvalidLength {
                expected: 32,
                got: 31
            }
        );
    }
}
