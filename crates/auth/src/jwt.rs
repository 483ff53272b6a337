//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use thiserror::Error;
use tracing::debug;

use crate::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("malformed or unsigned token: {0}")]
    Decode(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a bearer token and returns its validated claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// HMAC-SHA256 shared-secret validator.
///
/// The token's time window is carried as `issued_at`/`expires_at` and checked
/// by [`validate_claims`], not by the registered `exp` claim.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "jwt decode failed");
                JwtError::Decode(e.to_string())
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;
    use crate::{PrincipalId, Role};

    fn mint(secret: &str, claims: &JwtClaims) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(ttl_minutes: i64) -> JwtClaims {
        let now = Utc::now() - Duration::seconds(1);
        JwtClaims {
            sub: PrincipalId::new("user-42").unwrap(),
            roles: vec![Role::dispatcher()],
            issued_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    #[test]
    fn accepts_token_signed_with_same_secret() {
        let validator = Hs256JwtValidator::new("secret");
        let c = claims(10);
        let decoded = validator.validate(&mint("secret", &c), Utc::now()).unwrap();
        assert_eq!(decoded, c);
        assert!(decoded.has_role(&Role::DISPATCHER));
    }

    #[test]
    fn rejects_foreign_signature() {
        let validator = Hs256JwtValidator::new("secret");
        let err = validator
            .validate(&mint("other", &claims(10)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, JwtError::Decode(_)));
    }

    #[test]
    fn rejects_expired_claims() {
        let validator = Hs256JwtValidator::new("secret");
        let token = mint("secret", &claims(10));
        let err = validator
            .validate(&token, Utc::now() + Duration::minutes(30))
            .unwrap_err();
        assert_eq!(err, JwtError::Claims(TokenValidationError::Expired));
    }

    #[test]
    fn rejects_garbage() {
        let validator = Hs256JwtValidator::new("secret");
        assert!(validator.validate("not.a.jwt", Utc::now()).is_err());
    }
}
