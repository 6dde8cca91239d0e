use std::sync::Arc;

use config::Config;
use generation::ImageGenerator;
use quota::QuotaGate;

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod middleware;
pub mod quota;
pub mod router;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub quota: Arc<QuotaGate>,
    pub generator: Arc<dyn ImageGenerator>,
}
