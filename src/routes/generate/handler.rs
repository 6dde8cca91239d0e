use axum::{
    extract::{Json, State, rejection::JsonRejection},
    response::IntoResponse,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use uuid::Uuid;

use super::model::{GenerateRequest, GenerateResponse, QuotaStatus};
use crate::{
    AppState,
    error::AppError,
    generation::generate_with_retry,
    quota::{ClientIdentity, QuotaDecision},
};

#[axum::debug_handler]
pub async fn generate(
    State(state): State<AppState>,
    identity: ClientIdentity,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = Uuid::new_v4();
    let Json(payload) = payload?;
    let request = payload.into_generation_request(state.config.max_image_bytes)?;

    let scope = identity.scope();
    let decision = state.quota.check_and_consume(&scope).await.map_err(|e| {
        tracing::warn!(%request_id, scope = %scope, error = %e, "Quota check failed");
        AppError::from(e)
    })?;

    let (used, limit) = match decision {
        QuotaDecision::Allowed { used, limit } => (used, limit),
        QuotaDecision::Denied {
            used,
            limit,
            retry_after_secs,
            ..
        } => {
            return Err(AppError::Cooldown {
                scope: scope.scope_type,
                used,
                limit,
                retry_after_secs,
            });
        }
    };

    state.quota.record_device(&identity).await;

    tracing::info!(
        %request_id,
        scope = %scope,
        used,
        limit,
        style = %request.style,
        "Generation started"
    );

    let image = generate_with_retry(
        state.generator.as_ref(),
        &request,
        state.config.upstream_timeout(),
    )
    .await
    .map_err(|e| {
        tracing::warn!(%request_id, scope = %scope, error = %e, "Generation failed");
        AppError::from(e)
    })?;

    tracing::info!(%request_id, bytes = image.data.len(), "Generation finished");

    Ok(Json(GenerateResponse {
        image_base64: BASE64.encode(&image.data),
        mime_type: image.mime_type,
        style: request.style,
        quota: QuotaStatus {
            scope: scope.scope_type,
            used,
            limit,
        },
    }))
}
