use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tattoo_backend::{
    AppState,
    cache::{MemoryQuotaStore, QuotaStore, RedisQuotaStore},
    config::{Config, QuotaBackend},
    generation::{GeminiClient, ImageGenerator},
    quota::QuotaGate,
    router::create_router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 过期数据的清理间隔
const MEMORY_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置配额存储
    let store: Arc<dyn QuotaStore> = match config.quota_backend {
        QuotaBackend::Redis => {
            let redis_url = config
                .redis_url
                .clone()
                .expect("REDIS_URL is required for the redis quota backend");
            let redis_client =
                redis::Client::open(redis_url).expect("Failed to create Redis client");
            Arc::new(RedisQuotaStore::new(Arc::new(redis_client)))
        }
        QuotaBackend::Memory => {
            tracing::warn!("Using in-memory quota store, counters are not shared between instances");
            Arc::new(MemoryQuotaStore::new())
        }
    };

    // 定期清理过期数据
    let cleanup_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MEMORY_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_store
                .cleanup(chrono::Utc::now().timestamp_millis())
                .await
            {
                tracing::warn!(error = %e, "Quota store cleanup failed");
            }
        }
    });

    let quota = Arc::new(QuotaGate::new(store, config.quota_policy()));
    let generator: Arc<dyn ImageGenerator> = Arc::new(GeminiClient::with_base_url(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    ));

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        quota,
        generator,
    };

    let app = create_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .await
    .expect("Failed to start server");
}
