//! Cryptographic logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::Rng;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use validator::{ValidationError, ValidationErrors};
use zeroize::Zeroizing;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Cryptographic manager.
pub struct Crypto {
    pub pwd: PasswordManager,
    pub hasher: Hasher,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new(
        config: Option<ArgonConfig>,
        pepper: impl AsRef<[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            pwd: PasswordManager::new(config)?,
            hasher: Hasher::new(pepper),
        })
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    fn invalid_password() -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        errors.add(
            "password",
            ValidationError::new("invalid_password")
                .with_message("Invalid email or password.".into()),
        );
        errors
    }

    /// Verify password against a PHC.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: impl ToString,
    ) -> std::result::Result<(), ValidationErrors> {
        let phc_hash = phc_hash.to_string();

        let parsed = PasswordHash::new(&phc_hash)
            .map_err(|_| Self::invalid_password())?;

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .map_err(|_| Self::invalid_password())
    }
}

/// Peppered SHA-256, used for short-lived secrets such as reset codes.
pub struct Hasher(Zeroizing<Vec<u8>>);

impl Hasher {
    /// Create a new [`Hasher`].
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(pepper.as_ref().to_vec()))
    }

    /// Digest data into SHA256.
    pub fn digest(&self, data: impl AsRef<[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hasher.update(&data);
        let hash = hasher.finalize();

        hex::encode(hash)
    }
}

/// Generate a numeric one-time code, left-padded with zeros.
pub fn numeric_code(digits: u32) -> String {
    let upper = 10u64.pow(digits);
    let code = OsRng.gen_range(0..upper);
    format!("{code:0width$}", width = digits as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Option<ArgonConfig> {
        Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        })
    }

    #[test]
    fn test_argon2() {
        let pwd = PasswordManager::new(fast()).unwrap();
        let hash = pwd.hash_password("Abc12345").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("Abc12345", &hash).is_ok());
        assert!(pwd.verify_password("abc12345", &hash).is_err());
        assert!(pwd.verify_password("Abc12345", "not-a-phc").is_err());
    }

    #[test]
    fn test_sha2() {
        let hasher = Hasher::new("pepper");
        let other = Hasher::new("salt");

        assert_eq!(hasher.digest("123456"), hasher.digest("123456"));
        assert_ne!(hasher.digest("123456"), other.digest("123456"));
        assert_eq!(hasher.digest("123456").len(), 64);
    }

    #[test]
    fn test_numeric_code() {
        for _ in 0..100 {
            let code = numeric_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
