// ARCHITECTURE: HTTP Boundary
//
// API STRUCTURE:
// 1. PARAPHRASE (paraphrase.rs)
//    - POST /paraphrase: validated paraphrase generation
// 2. HEALTH (health.rs)
//    - GET /health: readiness and device information, never blocks on loading
//
// Handlers stay thin. Validation, readiness and generation live in
// `ParaphraseService`; errors become `{"detail": ...}` bodies via `AppError`.

pub mod health;
pub mod paraphrase;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{health::HealthReporter, service::ParaphraseService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ParaphraseService>,
    pub health: Arc<HealthReporter>,
}

impl AppState {
    pub fn new(service: Arc<ParaphraseService>) -> Self {
        let health = Arc::new(HealthReporter::new(Arc::clone(service.loader())));
        Self { service, health }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/paraphrase", post(paraphrase::paraphrase))
        .with_state(state)
}
