use axum::{extract::State, response::Json};

use crate::{api::AppState, health::HealthSnapshot};

pub async fn health_check(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.health.status())
}
