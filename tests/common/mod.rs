// Shared fakes for the integration suites: a scripted model source and a
// deterministic text generation model.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::Notify, time::Instant};

use paraphrase_server::{
    gpu_detection::{ComputeDevice, DeviceSelection},
    models::{
        FetchError, GenerationParams, ModelLoader, ModelSource, RetryPolicy, SharedModel,
        TextGenerationModel,
    },
    service::{GenerationLimits, ParaphraseService},
};

/// Deterministic model: sequence `i` decodes to "<prefix> <i>".
#[derive(Debug)]
pub struct FakeModel {
    pub prefix: String,
    pub fail_with: Option<String>,
    pub work: Duration,
    pub encode_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_params: Mutex<Option<GenerationParams>>,
    pub last_max_input: AtomicUsize,
}

impl FakeModel {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            fail_with: None,
            work: Duration::ZERO,
            encode_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            last_params: Mutex::new(None),
            last_max_input: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new("unused")
        }
    }

    pub fn slow(prefix: &str, work: Duration) -> Self {
        Self {
            work,
            ..Self::new(prefix)
        }
    }

    pub fn model_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst) + self.generate_calls.load(Ordering::SeqCst)
    }
}

impl TextGenerationModel for FakeModel {
    fn name(&self) -> &str {
        "fake/paraphraser"
    }

    fn encode(&self, text: &str, max_length: usize) -> anyhow::Result<Vec<u32>> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.last_max_input.store(max_length, Ordering::SeqCst);
        Ok(text.chars().take(max_length).map(|c| c as u32).collect())
    }

    fn generate(
        &self,
        _input_ids: &[u32],
        params: &GenerationParams,
    ) -> anyhow::Result<Vec<Vec<u32>>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        Ok((0..params.num_return_sequences as u32)
            .map(|i| vec![i])
            .collect())
    }

    fn decode(&self, tokens: &[u32]) -> anyhow::Result<String> {
        Ok(format!("{} {}", self.prefix, tokens[0]))
    }
}

/// Source that replays a script of outcomes, then keeps succeeding.
pub struct ScriptedSource {
    model: Arc<FakeModel>,
    script: Mutex<VecDeque<FetchError>>,
    always_fail: Option<FetchError>,
    gate: Option<Arc<Notify>>,
    pub attempts: AtomicUsize,
    pub attempt_times: Mutex<Vec<Instant>>,
    pub devices_seen: Mutex<Vec<ComputeDevice>>,
}

impl ScriptedSource {
    pub fn succeeding(model: Arc<FakeModel>) -> Self {
        Self::with_script(model, Vec::new())
    }

    pub fn with_script(model: Arc<FakeModel>, failures: Vec<FetchError>) -> Self {
        Self {
            model,
            script: Mutex::new(failures.into()),
            always_fail: None,
            gate: None,
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
            devices_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(error: FetchError) -> Self {
        Self {
            always_fail: Some(error),
            ..Self::succeeding(Arc::new(FakeModel::new("never")))
        }
    }

    /// Fetch blocks until the returned `Notify` is signalled.
    pub fn gated(model: Arc<FakeModel>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let source = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::succeeding(model)
        };
        (source, gate)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive fetch attempts.
    pub fn gaps(&self) -> Vec<Duration> {
        let times = self.attempt_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl ModelSource for ScriptedSource {
    fn model_id(&self) -> &str {
        "fake/paraphraser"
    }

    async fn fetch(&self, device: ComputeDevice) -> Result<SharedModel, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(Instant::now());
        self.devices_seen.lock().unwrap().push(device);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.model.clone() as SharedModel)
    }
}

pub fn transient(message: &str) -> FetchError {
    FetchError::Transient(message.to_string())
}

pub fn loader_for(source: Arc<ScriptedSource>) -> Arc<ModelLoader> {
    Arc::new(ModelLoader::new(
        source,
        RetryPolicy::default(),
        DeviceSelection::cpu(),
    ))
}

pub fn service_for(loader: Arc<ModelLoader>, max_concurrent: usize) -> Arc<ParaphraseService> {
    Arc::new(ParaphraseService::new(
        loader,
        GenerationLimits::default(),
        max_concurrent,
    ))
}

/// Loader that has already finished loading `model`.
pub async fn ready_service(model: Arc<FakeModel>, max_concurrent: usize) -> Arc<ParaphraseService> {
    let loader = loader_for(Arc::new(ScriptedSource::succeeding(model)));
    loader.acquire().await.expect("fake model loads");
    service_for(loader, max_concurrent)
}
