// ABOUTME: Identity provider webhooks that provision local users from Clerk events
// ABOUTME: Replayed events for an already known identity are acknowledged without writing a row

use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};

use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::storage::Provisioned;
use crate::types::{ClerkEvent, ProvisionResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/clerk", post(clerk_user_created))
}

pub async fn clerk_user_created(
    State(state): State<AppState>,
    ApiJson(event): ApiJson<ClerkEvent>,
) -> Result<(StatusCode, Json<ProvisionResponse>)> {
    let data = event.data.as_ref();
    let external_id = data
        .and_then(|data| data.id.as_deref())
        .filter(|id| !id.is_empty());
    let email = data.and_then(|data| data.primary_email());

    let (Some(external_id), Some(email)) = (external_id, email) else {
        return Err(AppError::BadRequest(
            "Missing Clerk user id or email in webhook payload".to_string(),
        ));
    };

    let provisioned = state
        .storage
        .provision_user(external_id, email)
        .await
        .map_err(|err| {
            AppError::Internal(format!("failed to create user from Clerk webhook: {err}"))
        })?;

    match provisioned {
        Provisioned::Created(user) => {
            tracing::info!(
                user_id = user.id,
                event = event.kind.as_deref().unwrap_or("unknown"),
                "provisioned user from Clerk webhook"
            );
            Ok((StatusCode::CREATED, Json(ProvisionResponse { created: true })))
        }
        Provisioned::Existing(user) => {
            tracing::info!(user_id = user.id, "Clerk identity already provisioned");
            Ok((StatusCode::OK, Json(ProvisionResponse { created: false })))
        }
    }
}
