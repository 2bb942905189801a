//! Generation and verification of swap secrets.

use crate::{
    secret::{Secret, SECRET_LENGTH},
    secret_hash::{HashAlgorithm, SecretHash},
};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

#[derive(Debug, thiserror::Error)]
#[error("failed to draw {requested} bytes from the randomness source")]
pub struct EntropyError {
    requested: usize,
    #[source]
    source: Option<rand::Error>,
}

impl EntropyError {
    pub fn new(requested: usize, source: Option<rand::Error>) -> Self {
        Self { requested, source }
    }
}

/// Source of the bytes a [`Secret`] is made of.
pub trait RandomnessSource: Send + Sync + 'static {
    fn try_fill_bytes(&self, dest: &mut [u8]) -> Result<(), EntropyError>;
}

impl RandomnessSource for OsRng {
    fn try_fill_bytes(&self, dest: &mut [u8]) -> Result<(), EntropyError> {
        RngCore::try_fill_bytes(&mut OsRng, dest)
            .map_err(|e| EntropyError::new(dest.len(), Some(e)))
    }
}

pub struct SecretManager {
    randomness: Box<dyn RandomnessSource>,
}

impl fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretManager").finish()
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(OsRng)
    }
}

impl SecretManager {
    pub fn new(randomness: impl RandomnessSource) -> Self {
        Self {
            randomness: Box::new(randomness),
        }
    }

    /// Draws a fresh secret and commits to it.
    ///
    /// A failing randomness source is an error, never a fallback to a weaker
    /// source.
    pub fn generate(&self, algorithm: HashAlgorithm) -> Result<(Secret, SecretHash), EntropyError> {
        let mut bytes = [0u8; SECRET_LENGTH];
        self.randomness.try_fill_bytes(&mut bytes)?;

        if bytes.iter().all(|b| *b == 0) {
            return Err(EntropyError::new(SECRET_LENGTH, None));
        }

        let secret = Secret::from(bytes);
        let secret_hash = SecretHash::new(algorithm, &secret);

        Ok((secret, secret_hash))
    }

    pub fn verify(&self, secret: &Secret, secret_hash: &SecretHash) -> bool {
        secret_hash.matches(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[derive(Debug, Clone, Copy)]
    struct BrokenSource;

    impl RandomnessSource for BrokenSource {
        fn try_fill_bytes(&self, dest: &mut [u8]) -> Result<(), EntropyError> {
            Err(EntropyError::new(dest.len(), None))
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct ZeroSource;

    impl RandomnessSource for ZeroSource {
        fn try_fill_bytes(&self, dest: &mut [u8]) -> Result<(), EntropyError> {
            dest.iter_mut().for_each(|b| *b = 0);
            Ok(())
        }
    }

    #[test]
    fn generated_secret_verifies_against_its_hash() {
        let manager = SecretManager::default();

        let (secret, hash) = manager.generate(HashAlgorithm::Sha256).unwrap();

        assert!(manager.verify(&secret, &hash));
        assert_eq!(hash.algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn two_secrets_differ() {
        let manager = SecretManager::default();

        let (first, _) = manager.generate(HashAlgorithm::Ripemd160).unwrap();
        let (second, _) = manager.generate(HashAlgorithm::Ripemd160).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn failing_source_is_an_entropy_error() {
        let manager = SecretManager::new(BrokenSource);

        assert_that(&manager.generate(HashAlgorithm::Sha256)).is_err();
    }

    #[test]
    fn all_zero_output_is_rejected() {
        let manager = SecretManager::new(ZeroSource);

        assert_that(&manager.generate(HashAlgorithm::Sha256)).is_err();
    }

    #[test]
    fn wrong_secret_does_not_verify() {
        let manager = SecretManager::default();
        let (_, hash) = manager.generate(HashAlgorithm::Hash160).unwrap();

        assert!(!manager.verify(&Secret::from([1u8; 32]), &hash));
    }
}
