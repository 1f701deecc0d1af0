// ARCHITECTURE: T5 Paraphraser Backend (candle)
//
// Downloads config.json, tokenizer.json and the weights from the Hugging Face
// hub, builds `T5ForConditionalGeneration`, and implements the
// `TextGenerationModel` capability on top of it.
//
// CONCURRENCY:
// candle's T5 keeps a KV cache inside the model and needs `&mut self` to
// run. Each generate call clones the model (weights are shared through
// reference-counted storage) and runs with the cache disabled, so concurrent
// requests never share decoding state and beams can be reordered freely.
//
// FAILURE CLASSIFICATION:
// - network/storage errors while downloading  -> FetchError::Transient
// - file missing from the repository (404)    -> FetchError::Permanent
// - bad config/tokenizer/weights, bad device  -> FetchError::Permanent

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Result, anyhow, ensure};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5;
use hf_hub::{
    Repo, RepoType,
    api::sync::{ApiBuilder, ApiRepo},
};
use tokenizers::Tokenizer;

use crate::config::ModelConfig;
use crate::gpu_detection::ComputeDevice;
use crate::models::beam_search;
use crate::models::traits::{
    FetchError, GenerationParams, ModelSource, SharedModel, TextGenerationModel,
};

/// Where to download the model from.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub model_id: String,
    pub revision: String,
    pub tokenizer_id: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl From<&ModelConfig> for HubSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model_id: config.model_id.clone(),
            revision: config.revision.clone(),
            tokenizer_id: config.tokenizer_id.clone(),
            cache_dir: config.cache_dir.as_ref().map(PathBuf::from),
        }
    }
}

/// `ModelSource` backed by the Hugging Face hub.
#[derive(Debug, Clone)]
pub struct HubModelSource {
    settings: HubSettings,
}

impl HubModelSource {
    pub fn new(settings: HubSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ModelSource for HubModelSource {
    fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    async fn fetch(&self, device: ComputeDevice) -> std::result::Result<SharedModel, FetchError> {
        let settings = self.settings.clone();
        let model = tokio::task::spawn_blocking(move || T5Paraphraser::load_sync(&settings, device))
            .await
            .map_err(|e| FetchError::Transient(format!("Model loading task failed: {e}")))??;

        Ok(Arc::new(model))
    }
}

pub struct T5Paraphraser {
    model: t5::T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    config: t5::Config,
    device: Device,
    model_id: String,
}

impl std::fmt::Debug for T5Paraphraser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("T5Paraphraser")
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .field("vocab_size", &self.config.vocab_size)
            .finish()
    }
}

impl T5Paraphraser {
    fn load_sync(
        settings: &HubSettings,
        compute: ComputeDevice,
    ) -> std::result::Result<Self, FetchError> {
        let device = compute
            .to_candle()
            .map_err(|e| FetchError::Permanent(format!("Failed to open {compute} device: {e}")))?;
        tracing::info!(model_id = %settings.model_id, device = ?device, "Starting T5 model loading");

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(cache_dir) = &settings.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| FetchError::Transient(format!("Failed to initialise hub client: {e}")))?;

        let repo = api.repo(Repo::with_revision(
            settings.model_id.clone(),
            RepoType::Model,
            settings.revision.clone(),
        ));

        tracing::info!("Downloading configuration files...");
        let config_file = download(&repo, "config.json")?;
        let tokenizer_file = match &settings.tokenizer_id {
            Some(tokenizer_id) => {
                let tokenizer_repo = api.model(tokenizer_id.clone());
                download(&tokenizer_repo, "tokenizer.json")?
            }
            None => download(&repo, "tokenizer.json").map_err(|e| match e {
                FetchError::Permanent(message) => FetchError::Permanent(format!(
                    "{message}. Set TOKENIZER_ID to a repository that ships tokenizer.json"
                )),
                transient => transient,
            })?,
        };

        let config_json = fs::read_to_string(&config_file)
            .map_err(|e| FetchError::Transient(format!("Failed to read config.json: {e}")))?;
        let mut config: t5::Config = serde_json::from_str(&config_json)
            .map_err(|e| FetchError::Permanent(format!("Invalid config.json: {e}")))?;
        config.use_cache = false;
        tracing::info!(
            vocab_size = config.vocab_size,
            d_model = config.d_model,
            num_layers = config.num_layers,
            "Parsed T5 config"
        );

        let tokenizer = Tokenizer::from_file(&tokenizer_file)
            .map_err(|e| FetchError::Permanent(format!("Failed to load tokenizer: {e}")))?;

        tracing::info!("Downloading model weights...");
        let weight_file = download_weight_file(&repo)?;
        let vars = load_weights(&weight_file, &device)
            .map_err(|e| FetchError::Permanent(format!("Failed to load weights: {e}")))?;

        tracing::info!("Building model graph...");
        let model = t5::T5ForConditionalGeneration::load(vars, &config)
            .map_err(|e| FetchError::Permanent(format!("Failed to build T5 model: {e}")))?;

        tracing::info!(model_id = %settings.model_id, "T5 model loaded successfully");
        Ok(Self {
            model,
            tokenizer,
            config,
            device,
            model_id: settings.model_id.clone(),
        })
    }

    fn decoder_start_token(&self) -> u32 {
        self.config
            .decoder_start_token_id
            .unwrap_or(self.config.pad_token_id) as u32
    }

    fn eos_token(&self) -> u32 {
        self.config.eos_token_id as u32
    }
}

impl TextGenerationModel for T5Paraphraser {
    fn name(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let ids = truncate_input(encoding.get_ids().to_vec(), max_length, self.eos_token());
        ensure!(!ids.is_empty(), "Tokenizer produced no tokens");
        Ok(ids)
    }

    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<Vec<u32>>> {
        let mut model = self.model.clone();
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        let mut rng = rand::rng();
        beam_search::beam_sample(
            params,
            self.decoder_start_token(),
            self.eos_token(),
            |sequences: &[Vec<u32>]| {
                next_token_logits(&mut model, &encoder_output, sequences, &self.device)
            },
            &mut rng,
        )
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Decoding failed: {}", e))
    }
}

/// Caps `ids` at `max_length` tokens. A cut sequence still ends with EOS.
fn truncate_input(mut ids: Vec<u32>, max_length: usize, eos_token: u32) -> Vec<u32> {
    if ids.len() > max_length {
        tracing::debug!(tokens = ids.len(), max_length, "Truncating input");
        ids.truncate(max_length);
        if let Some(last) = ids.last_mut() {
            *last = eos_token;
        }
    }
    ids
}

/// One decoder step for every live beam: returns last-position logits, one
/// row per sequence. All sequences must have the same length.
fn next_token_logits(
    model: &mut t5::T5ForConditionalGeneration,
    encoder_output: &Tensor,
    sequences: &[Vec<u32>],
    device: &Device,
) -> Result<Vec<Vec<f32>>> {
    let batch = sequences.len();
    let len = sequences.first().map(Vec::len).unwrap_or(0);
    ensure!(batch > 0 && len > 0, "No decoder sequences to extend");
    ensure!(
        sequences.iter().all(|s| s.len() == len),
        "Decoder sequences differ in length"
    );

    let flat: Vec<u32> = sequences.concat();
    let decoder_ids = Tensor::from_vec(flat, (batch, len), device)?;
    let encoder_states = encoder_output.repeat((batch, 1, 1))?;
    let logits = model.decode(&decoder_ids, &encoder_states)?;
    Ok(logits.to_dtype(DType::F32)?.to_vec2::<f32>()?)
}

const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

fn download(repo: &ApiRepo, filename: &str) -> std::result::Result<PathBuf, FetchError> {
    repo.get(filename)
        .map_err(|e| classify_download_error(filename, &e.to_string()))
}

/// A missing file stays missing, so only network-level failures are retried.
fn classify_download_error(filename: &str, message: &str) -> FetchError {
    if is_not_found(message) {
        FetchError::Permanent(format!("{filename} not found in repository ({message})"))
    } else {
        FetchError::Transient(format!("Failed to download {filename}: {message}"))
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("status code 404") || message.contains("404 Not Found")
}

fn download_weight_file(repo: &ApiRepo) -> std::result::Result<PathBuf, FetchError> {
    let mut failures = Vec::with_capacity(WEIGHT_FILES.len());
    for filename in WEIGHT_FILES {
        match download(repo, filename) {
            Ok(path) => {
                tracing::debug!("Found weight file: {}", filename);
                return Ok(path);
            }
            Err(e) => failures.push(e),
        }
    }
    Err(missing_weights_error(failures))
}

/// Permanent only when every candidate file is absent from the repository.
fn missing_weights_error(failures: Vec<FetchError>) -> FetchError {
    let all_missing = failures
        .iter()
        .all(|e| matches!(e, FetchError::Permanent(_)));
    let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
    let message = format!("No model weight files found ({})", details.join("; "));

    if all_missing {
        FetchError::Permanent(message)
    } else {
        FetchError::Transient(message)
    }
}

fn load_weights(weight_file: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    if weight_file.extension().and_then(|s| s.to_str()) == Some("safetensors") {
        tracing::info!("Loading safetensors weights...");
        // SAFETY: the file is owned by the hub cache and not modified while mapped.
        let vars = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weight_file], DType::F32, device)?
        };
        Ok(vars)
    } else {
        tracing::info!("Loading PyTorch weights...");
        let tensors: HashMap<String, Tensor> =
            candle_core::pickle::read_all(weight_file)?.into_iter().collect();
        Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
    }
}
