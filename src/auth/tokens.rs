use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DomainConfig;
use crate::db::models::{Account, Role};
use crate::error::AuthError;

/// Claims carried by both token kinds. Access and refresh tokens are
/// identical in shape; they differ only in TTL and signing secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token. Without it two logins inside the same second would
    /// mint byte-identical refresh tokens and supersession could not be
    /// observed.
    pub jti: Uuid,
}

/// Mints and verifies the access/refresh token pair for one identity
/// domain. Access tokens are short-lived (minutes) and stateless; refresh
/// tokens are long-lived (days) and double as the server-side session
/// pointer.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &DomainConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
        }
    }

    pub fn mint_access(&self, account: &Account) -> Result<String, AuthError> {
        self.mint(account, &self.access_encoding, self.access_ttl)
    }

    pub fn mint_refresh(&self, account: &Account) -> Result<String, AuthError> {
        self.mint(account, &self.refresh_encoding, self.refresh_ttl)
    }

    fn mint(
        &self,
        account: &Account,
        key: &EncodingKey,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            role: account.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
        };
        encode(&Header::default(), &claims, key).map_err(AuthError::from)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        Self::verify(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        Self::verify(token, &self.refresh_decoding)
    }

    fn verify(token: &str, key: &DecodingKey) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, key, &validation)?;
        Ok(data.claims)
    }

    /// Decode a token WITHOUT verifying its signature or expiry.
    ///
    /// The result must never be used to authorize anything: it only
    /// locates a candidate account whose stored session pointer is then
    /// checked on its own merits (the check-session fallback path).
    pub fn decode_unverified(token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DomainConfig {
        DomainConfig {
            access_secret: "access_secret".to_string(),
            refresh_secret: "refresh_secret".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
            table: "travelers".to_string(),
        }
    }

    fn account() -> Account {
        Account::new(
            "Alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
            Role::Traveler,
        )
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = TokenIssuer::new(&test_config());
        let acc = account();
        let token = issuer.mint_access(&acc).unwrap();
        let claims = issuer.verify_access(&token).unwrap();
        assert_eq!(claims.sub, acc.id);
        assert_eq!(claims.email, acc.email);
        assert_eq!(claims.role, acc.role);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_keys_are_not_interchangeable() {
        let issuer = TokenIssuer::new(&test_config());
        let acc = account();
        let access = issuer.mint_access(&acc).unwrap();
        let refresh = issuer.mint_refresh(&acc).unwrap();

        assert!(issuer.verify_access(&access).is_ok());
        assert!(issuer.verify_refresh(&refresh).is_ok());
        assert_eq!(issuer.verify_access(&refresh).unwrap_err(), AuthError::InvalidToken);
        assert_eq!(issuer.verify_refresh(&access).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_expired_token_maps_to_token_expired() {
        let issuer = TokenIssuer::new(&test_config());
        let acc = account();
        let now = Utc::now();
        let claims = Claims {
            sub: acc.id,
            email: acc.email.clone(),
            role: acc.role,
            iat: (now - Duration::minutes(30)).timestamp(),
            exp: (now - Duration::minutes(15)).timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"access_secret"),
        )
        .unwrap();
        assert_eq!(issuer.verify_access(&token).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn test_wrong_signature_is_terminal() {
        let issuer = TokenIssuer::new(&test_config());
        let forged = DomainConfig {
            access_secret: "some_other_secret".to_string(),
            ..test_config()
        };
        let token = TokenIssuer::new(&forged).mint_access(&account()).unwrap();
        assert_eq!(issuer.verify_access(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_decode_unverified_recovers_claims_from_expired_token() {
        let acc = account();
        let now = Utc::now();
        let claims = Claims {
            sub: acc.id,
            email: acc.email.clone(),
            role: acc.role,
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"whatever"),
        )
        .unwrap();
        let decoded = TokenIssuer::decode_unverified(&token).unwrap();
        assert_eq!(decoded.sub, acc.id);

        assert!(TokenIssuer::decode_unverified("not-a-jwt").is_none());
    }
}
