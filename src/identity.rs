// ABOUTME: Verification of Clerk session tokens into an external caller identity
// ABOUTME: Tokens come from a bearer Authorization header or the Clerk __session cookie

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::extract::CallerIdentity;

const SESSION_COOKIE_NAME: &str = "__session";
const CLOCK_SKEW_LEEWAY_SECS: u64 = 5;

pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<CallerIdentity>;
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Clerk signs session tokens with RS256; the PEM is the instance's JWT public key.
    pub fn from_rsa_pem(pem: &str) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::Internal(format!("invalid Clerk JWT key: {e}")))?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    /// Shared-secret variant for local development and tests.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { key, validation }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<CallerIdentity> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid session token: {e}")))?;

        if data.claims.sub.is_empty() {
            return Err(AppError::Unauthorized("session token has no subject".to_string()));
        }

        Ok(CallerIdentity(data.claims.sub))
    }
}

/// Bearer token if present, otherwise the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}
