// ARCHITECTURE: Model Capability Seam
//
// The paraphrasing core never touches tensors. It talks to two traits:
// - `TextGenerationModel`: encode / generate / decode on an already loaded model
// - `ModelSource`: one fetch attempt for that model, with an explicit outcome
//
// The candle T5 backend implements both; tests plug in scripted fakes.

use std::{fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;

use crate::gpu_detection::ComputeDevice;

/// Decoding parameters for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub num_return_sequences: usize,
    pub num_beams: usize,
    pub temperature: f64,
    pub max_length: usize,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            num_return_sequences: 1,
            num_beams: 5,
            temperature: 1.0,
            max_length: 256,
            do_sample: true,
        }
    }
}

/// A loaded sequence-to-sequence model together with its tokenizer.
///
/// Methods take `&self` and may be called from several blocking threads at
/// once; implementations keep any per-call decoding state local.
pub trait TextGenerationModel: Send + Sync + Debug {
    /// Model identifier, e.g. the hub repository name.
    fn name(&self) -> &str;

    /// Tokenizes `text`, truncating to at most `max_length` tokens.
    fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>>;

    /// Runs generation and returns the sequences best-first.
    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<Vec<u32>>>;

    /// Turns a generated sequence back into text without special tokens.
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

pub type SharedModel = Arc<dyn TextGenerationModel>;

/// Outcome of a failed fetch attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Network or storage hiccup; worth another attempt.
    #[error("{0}")]
    Transient(String),

    /// Retrying cannot help (bad config, missing files, unsupported device).
    #[error("{0}")]
    Permanent(String),
}

/// Where the model comes from. `fetch` is a single attempt; retrying is the
/// loader's job.
#[async_trait]
pub trait ModelSource: Send + Sync {
    fn model_id(&self) -> &str;

    async fn fetch(&self, device: ComputeDevice) -> std::result::Result<SharedModel, FetchError>;
}
