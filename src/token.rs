//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

const ISSUER: &str = "hirewise";

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Identifies the expiration time (seconds) on or after which the JWT
    /// must not be accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: u64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with an HMAC secret.
    pub fn new(secret: &str, lifetime: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(ServerError::Internal {
                details: "missing JWT secret".into(),
                source: None,
            });
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        })
    }

    /// Token lifetime, in seconds.
    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(&self, user_id: &str) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::internal("clock went backwards", err))?
            .as_secs();
        let claims = Claims {
            exp: time + self.lifetime,
            iat: time,
            iss: ISSUER.to_owned(),
            sub: user_id.to_owned(),
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let manager = TokenManager::new("secret", 60).unwrap();
        let token = manager.create("f3b5c7a0-0000-4000-8000-000000000001").unwrap();

        let claims = manager.decode(&token).unwrap();
        assert_eq!(claims.sub, "f3b5c7a0-0000-4000-8000-000000000001");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let manager = TokenManager::new("secret", 60).unwrap();
        let other = TokenManager::new("another", 60).unwrap();

        let token = other.create("someone").unwrap();
        assert!(manager.decode(&token).is_err());
        assert!(manager.decode("not.a.token").is_err());
    }

    #[test]
    fn test_requires_secret() {
        assert!(TokenManager::new("", 60).is_err());
    }
}
