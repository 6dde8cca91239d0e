use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState,
    middleware::log_errors,
    quota::{DEVICE_ID_HEADER, USER_ID_HEADER},
    routes,
};

/// 浏览器客户端直接调用，允许任意来源
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(DEVICE_ID_HEADER),
            HeaderName::from_static(USER_ID_HEADER),
        ])
}

// 生成相关的路由
pub fn generate_routes() -> Router<AppState> {
    Router::new().route("/generate", post(routes::generate::generate))
}

// 创建主路由
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    let router = match state.config.api_base_uri.trim_end_matches('/') {
        "" => Router::new().merge(generate_routes()),
        base => Router::new().nest(base, generate_routes()),
    };

    router
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(log_errors))
        // 5xx 由 log_errors 统一记录
        .layer(TraceLayer::new_for_http().on_failure(()))
        .layer(cors_layer())
        .with_state(state)
}
