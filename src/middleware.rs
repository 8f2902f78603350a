// ABOUTME: Request middleware for caller identity resolution and defensive response headers
// ABOUTME: Identity resolution never rejects; handlers that need a caller demand CallerIdentity

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::{identity, AppState};

pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = identity::session_token(request.headers()) {
        match state.identity.verify(&token) {
            Ok(caller) => {
                tracing::debug!(caller = %caller.0, "resolved caller identity");
                request.extensions_mut().insert(caller);
            }
            Err(err) => tracing::debug!("ignoring session token: {err}"),
        }
    }

    next.run(request).await
}

pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();

    // Prevent MIME type sniffing of served assets
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    // Prevent clickjacking
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    response
}
