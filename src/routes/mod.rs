use axum::{Json, response::IntoResponse};

pub mod generate;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
