use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::logging::Requester;
use crate::model::common::identity::Identity;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// Proof that the request comes from an authenticated identity.
///
/// Tokens are issued elsewhere; this server only verifies them. A token is
/// an HS256 JWT whose `sub` claim is the identity, carried either in the
/// [`AUTH_TOKEN_COOKIE`] cookie or an `Authorization: Bearer` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    identity: Identity,
}

/// Why a request could not be authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token supplied")]
    Missing,
    #[error("Invalid authentication token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

impl AuthToken {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn into_identity(self) -> Identity {
        self.identity
    }

    /// Sign this token, valid until `expire_at`.
    pub fn encode(&self, config: &Config, expire_at: DateTime<Utc>) -> String {
        let claims = Claims {
            identity: self.identity.clone(),
            expire_at,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings")
    }

    /// Sign this token into a cookie, valid until `expire_at`.
    pub fn into_cookie(self, config: &Config, expire_at: DateTime<Utc>) -> Cookie<'static> {
        let max_age = Duration::seconds((expire_at - Utc::now()).num_seconds().max(0));
        Cookie::build(AUTH_TOKEN_COOKIE, self.encode(config, expire_at))
            .max_age(max_age)
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self, AuthError> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| Self::new(claims.claims.identity))?;
        Ok(token)
    }
}

/// Token claims: the identity plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "sub")]
    identity: Identity,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Find the raw token in the request, preferring the cookie.
fn raw_token<'r>(req: &'r Request<'_>) -> Option<String> {
    if let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = AuthError;

    /// Fails with `401 Unauthorized` if there is no valid token. Routes that
    /// also serve anonymous users take an `Option<AuthToken>` instead.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let raw = match raw_token(req) {
            Some(raw) => raw,
            None => return Outcome::Failure((Status::Unauthorized, AuthError::Missing)),
        };

        match Self::decode(&raw, config) {
            Ok(token) => {
                Requester::record(req, token.identity());
                Outcome::Success(token)
            }
            Err(e) => {
                debug!("Rejected authentication token: {e}");
                Outcome::Failure((Status::Unauthorized, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    fn config() -> Config {
        rocket::figment::Figment::from(("jwt_secret", "test-secret"))
            .extract()
            .unwrap()
    }

    #[test]
    fn token_round_trip() {
        let config = config();
        let token = AuthToken::new(Identity::voter_example());
        let raw = token.encode(&config, Utc::now() + ChronoDuration::hours(1));
        let decoded = AuthToken::decode(&raw, &config).unwrap();
        assert_eq!(decoded.identity(), &Identity::voter_example());
    }

    #[test]
    fn expired_token_rejected() {
        let config = config();
        let raw = AuthToken::new(Identity::voter_example())
            .encode(&config, Utc::now() - ChronoDuration::hours(1));
        assert!(AuthToken::decode(&raw, &config).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let raw = AuthToken::new(Identity::voter_example())
            .encode(&config(), Utc::now() + ChronoDuration::hours(1));
        let other: Config = rocket::figment::Figment::from(("jwt_secret", "another-secret"))
            .extract()
            .unwrap();
        assert!(AuthToken::decode(&raw, &other).is_err());
    }
}
