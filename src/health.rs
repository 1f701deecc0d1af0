use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::models::{ModelLoader, ReadinessState};

/// Point-in-time service status. Built fresh on every query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub model_loaded: bool,
    pub device: String,
    #[serde(rename = "cuda_available")]
    pub accelerator_available: bool,
    pub model_state: ReadinessState,
    pub model_id: String,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct HealthReporter {
    loader: Arc<ModelLoader>,
}

impl HealthReporter {
    pub fn new(loader: Arc<ModelLoader>) -> Self {
        Self { loader }
    }

    /// Never fails and never waits on model loading.
    pub fn status(&self) -> HealthSnapshot {
        let state = self.loader.state();
        let devices = self.loader.devices();

        HealthSnapshot {
            status: "healthy",
            model_loaded: state == ReadinessState::Ready,
            device: devices.device.as_str().to_string(),
            accelerator_available: devices.cuda_available,
            model_state: state,
            model_id: self.loader.model_id().to_string(),
            service: "paraphrase-server",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
