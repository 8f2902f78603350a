// ABOUTME: Custom axum extractors for JSON bodies, the serving origin, and the caller identity
// ABOUTME: Extraction failures are converted into AppError so every route answers with the same JSON shape

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header, request::Parts},
};
use std::convert::Infallible;

use crate::error::AppError;
use crate::types::AssetKind;

/// `axum::Json` whose rejections render as `AppError::BadRequest`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Scheme and host the request was addressed to, used to build absolute links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    scheme: String,
    host: String,
}

impl RequestOrigin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        let scheme = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("http");

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|authority| authority.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Self::new(scheme, host)
    }

    /// `<scheme>://<host>/articles/<kind>/<encoded file>`
    pub fn asset_url(&self, kind: AssetKind, file: &str) -> String {
        format!(
            "{}://{}/articles/{}/{}",
            self.scheme,
            self.host,
            kind.route_segment(),
            urlencoding::encode(file)
        )
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// External identity of the caller, placed in request extensions by the identity middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Could not find user".to_string()))
    }
}

/// Parses a numeric path id, answering BadRequest for anything else.
pub fn parse_id(raw: &str, what: &str) -> Result<i32, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {what} id")))
}
