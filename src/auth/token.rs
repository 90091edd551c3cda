use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::TokenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub user_id: i64,
    /// Unique per issuance.
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies session tokens with a shared HMAC secret.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, &config.issuer)
    }

    pub fn issue(&self, user_id: i64, expires_at: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = ClaimSet {
            user_id,
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Checks algorithm family, signature, issuer and `now <= exp`.
    pub fn parse_and_verify(&self, token: &str) -> Result<ClaimSet, TokenError> {
        let data = decode::<ClaimSet>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use chrono::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new("test_secret", "todolist")
    }

    #[test]
    fn test_issue_then_verify_recovers_subject() {
        let codec = codec();
        let expires_at = Utc::now() + Duration::minutes(15);
        let token = codec.issue(42, expires_at).unwrap();

        let claims = codec.parse_and_verify(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.iss, "todolist");
        assert_eq!(claims.exp, expires_at.timestamp());
        assert!(claims.iat <= claims.exp);
    }

    #[test]
    fn test_same_second_issuance_yields_distinct_tokens() {
        let codec = codec();
        let expires_at = Utc::now() + Duration::minutes(15);
        let first = codec.issue(7, expires_at).unwrap();
        let second = codec.issue(7, expires_at).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let codec = codec();
        let token = codec.issue(1, Utc::now() - Duration::seconds(5)).unwrap();
        assert_eq!(codec.parse_and_verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenCodec::new("other_secret", "todolist")
            .issue(1, Utc::now() + Duration::minutes(5))
            .unwrap();
        assert_eq!(codec().parse_and_verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_foreign_issuer_is_rejected() {
        let token = TokenCodec::new("test_secret", "someone-else")
            .issue(1, Utc::now() + Duration::minutes(5))
            .unwrap();
        assert!(matches!(
            codec().parse_and_verify(&token),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            codec().parse_and_verify("not-a-token"),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_other_hmac_strengths_are_accepted() {
        let claims = ClaimSet {
            user_id: 9,
            jti: "fixed".into(),
            iss: "todolist".into(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        assert_eq!(codec().parse_and_verify(&token).unwrap(), claims);
    }

    #[test]
    fn test_unsigned_token_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let exp = (Utc::now() + Duration::minutes(5)).timestamp();
        let payload = URL_SAFE_NO_PAD.encode(
            format!(r#"{{"user_id":1,"jti":"x","iss":"todolist","iat":0,"exp":{}}}"#, exp)
                .as_bytes(),
        );
        let token = format!("{}.{}.", header, payload);

        assert!(codec().parse_and_verify(&token).is_err());
    }
}
