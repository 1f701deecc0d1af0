// ARCHITECTURE: Model Loader - One Shared Handle Per Process
//
// LIFECYCLE:
//   Loading ──fetch ok──────────────► Ready   (terminal)
//      │
//      └──retries exhausted/permanent─► Failed  (terminal)
//
// The handle lives in a `OnceLock`, so readers either see nothing or a fully
// built handle. Readiness is derived from the two once-cells instead of being
// stored separately, which keeps `state()` and `handle()` consistent.
//
// RETRY POLICY:
// - Up to `max_attempts` fetches (default 3)
// - Sleep base, 2*base, 4*base ... between attempts (default 5s, 10s, 20s)
// - `FetchError::Permanent` stops immediately

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::gpu_detection::{ComputeDevice, DeviceSelection};
use crate::models::traits::{FetchError, ModelSource, SharedModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    Loading,
    Ready,
    Failed,
}

impl ReadinessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessState::Loading => "loading",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// The loaded model, tagged with where it runs. Immutable once built.
#[derive(Debug)]
pub struct ModelHandle {
    model: SharedModel,
    device: ComputeDevice,
    model_id: String,
    loaded_at: DateTime<Utc>,
}

impl ModelHandle {
    pub fn new(model: SharedModel, device: ComputeDevice, model_id: impl Into<String>) -> Self {
        Self {
            model,
            device,
            model_id: model_id.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn shared_model(&self) -> SharedModel {
        Arc::clone(&self.model)
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

pub struct ModelLoader {
    source: Arc<dyn ModelSource>,
    policy: RetryPolicy,
    devices: DeviceSelection,
    handle: OnceLock<Arc<ModelHandle>>,
    failure: OnceLock<String>,
    load_lock: Mutex<()>,
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("model_id", &self.source.model_id())
            .field("policy", &self.policy)
            .field("devices", &self.devices)
            .field("state", &self.state())
            .finish()
    }
}

impl ModelLoader {
    pub fn new(source: Arc<dyn ModelSource>, policy: RetryPolicy, devices: DeviceSelection) -> Self {
        Self {
            source,
            policy,
            devices,
            handle: OnceLock::new(),
            failure: OnceLock::new(),
            load_lock: Mutex::new(()),
        }
    }

    /// Loads the model once. Later calls return the same handle, or the
    /// recorded failure, without fetching again. Concurrent callers wait for
    /// the single in-flight load.
    pub async fn acquire(&self) -> Result<Arc<ModelHandle>> {
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        let _guard = self.load_lock.lock().await;

        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }
        if let Some(message) = self.failure.get() {
            return Err(Error::ModelLoad(message.clone()));
        }

        let model_id = self.source.model_id().to_string();
        let device = self.devices.device;
        let max_attempts = self.policy.max_attempts();
        info!(model_id = %model_id, device = %device, "Loading model");

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(attempt, max_attempts, "Attempt {}/{} to load model", attempt, max_attempts);

            match self.source.fetch(device).await {
                Ok(model) => {
                    let handle = Arc::new(ModelHandle::new(model, device, model_id.clone()));
                    let handle = Arc::clone(self.handle.get_or_init(|| handle));
                    info!(attempt, model_id = %model_id, device = %device, "Model loaded successfully");
                    return Ok(handle);
                }
                Err(FetchError::Permanent(message)) => {
                    error!(attempt, error = %message, "Model loading failed permanently");
                    return Err(self.record_failure(message));
                }
                Err(FetchError::Transient(message)) if attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %message,
                        "Error loading model, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(FetchError::Transient(message)) => {
                    error!(attempt, error = %message, "Failed to load model after {} attempts", attempt);
                    return Err(self.record_failure(format!(
                        "failed after {attempt} attempts: {message}"
                    )));
                }
            }
        }
    }

    fn record_failure(&self, message: String) -> Error {
        let message = self.failure.get_or_init(|| message).clone();
        Error::ModelLoad(message)
    }

    /// Current handle, if loading has completed. Never waits.
    pub fn handle(&self) -> Option<Arc<ModelHandle>> {
        self.handle.get().cloned()
    }

    pub fn state(&self) -> ReadinessState {
        if self.handle.get().is_some() {
            ReadinessState::Ready
        } else if self.failure.get().is_some() {
            ReadinessState::Failed
        } else {
            ReadinessState::Loading
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    pub fn devices(&self) -> DeviceSelection {
        self.devices
    }

    pub fn model_id(&self) -> &str {
        self.source.model_id()
    }
}
