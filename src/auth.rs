//! Handshake authentication.
//!
//! Tokens are issued by the external auth service; this module only verifies
//! them. Verification happens once, during the WebSocket upgrade, and a
//! failure rejects the connection before any registry mutation.

use crate::error::EngineError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a chatterd bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The identity key (account email).
    pub email: String,
    /// Expiry as a Unix timestamp. Required; expired tokens are rejected.
    pub exp: i64,
}

/// Verify an HS256 bearer token and return the authenticated identity key.
pub fn verify_token(secret: &str, token: &str) -> Result<String, EngineError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.insert("exp".to_string());

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| EngineError::Authentication(e.to_string()))?;

    if data.claims.email.is_empty() {
        return Err(EngineError::Authentication("empty identity".to_string()));
    }
    Ok(data.claims.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn issue(secret: &str, email: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                email: email.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn accepts_valid_token() {
        let token = issue("s3cret", "alice@x", future());
        assert_eq!(verify_token("s3cret", &token).unwrap(), "alice@x");
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue("s3cret", "alice@x", future());
        assert!(matches!(
            verify_token("other", &token),
            Err(EngineError::Authentication(_))
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue("s3cret", "alice@x", chrono::Utc::now().timestamp() - 600);
        assert!(matches!(
            verify_token("s3cret", &token),
            Err(EngineError::Authentication(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            verify_token("s3cret", "not-a-jwt"),
            Err(EngineError::Authentication(_))
        ));
    }
}
