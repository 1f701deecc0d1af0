// ARCHITECTURE: Paraphrase Service - Request Orchestration
//
// REQUEST FLOW:
//   Received ─► Validated ─► Generated ─► Returned
//       │            │            │
//       │            │            └─► GenerationFailed (500)
//       │            └─► ServiceUnavailable (503), never waits on the loader
//       └─► RejectedEmpty (400) / InvalidParameter (422)
//
// Generation runs on the blocking pool behind a semaphore. A limit of 1
// serializes every model call through a single critical section.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{GenerationParams, ModelLoader, TextGenerationModel};
use crate::validation::TextValidator;

fn default_num_return_sequences() -> usize {
    1
}

fn default_num_beams() -> usize {
    5
}

fn default_temperature() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParaphraseRequest {
    pub text: String,
    #[serde(default = "default_num_return_sequences")]
    pub num_return_sequences: usize,
    #[serde(default = "default_num_beams")]
    pub num_beams: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl ParaphraseRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            num_return_sequences: default_num_return_sequences(),
            num_beams: default_num_beams(),
            temperature: default_temperature(),
        }
    }

    pub fn with_num_return_sequences(mut self, n: usize) -> Self {
        self.num_return_sequences = n;
        self
    }

    pub fn with_num_beams(mut self, n: usize) -> Self {
        self.num_beams = n;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Blank-text check plus field constraints. Character classes are not
    /// checked here, see [`crate::validation::TextValidator`].
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::RejectedEmpty);
        }
        if self.num_return_sequences == 0 {
            return Err(Error::InvalidParameter(
                "num_return_sequences must be at least 1".to_string(),
            ));
        }
        if self.num_beams == 0 {
            return Err(Error::InvalidParameter(
                "num_beams must be at least 1".to_string(),
            ));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "temperature must be a strictly positive float, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParaphraseResult {
    pub original_text: String,
    pub paraphrases: Vec<String>,
    pub device: String,
}

/// Token limits applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimits {
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            max_input_tokens: 256,
            max_output_tokens: 256,
        }
    }
}

pub struct ParaphraseService {
    loader: Arc<ModelLoader>,
    limits: GenerationLimits,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ParaphraseService {
    pub fn new(loader: Arc<ModelLoader>, limits: GenerationLimits, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            loader,
            limits,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn paraphrase(&self, request: ParaphraseRequest) -> Result<ParaphraseResult> {
        request.validate()?;

        // Informational only: the model gets the text exactly as sent.
        if !TextValidator::is_valid(&request.text) {
            let dropped = request.text.chars().count()
                - TextValidator::filter(&request.text).chars().count();
            debug!(dropped, "Input contains characters outside the accepted classes");
        }

        let handle = self
            .loader
            .handle()
            .ok_or_else(|| Error::ServiceUnavailable(self.loader.state()))?;

        let params = GenerationParams {
            num_return_sequences: request.num_return_sequences,
            num_beams: request.num_beams,
            temperature: request.temperature,
            max_length: self.limits.max_output_tokens,
            do_sample: true,
        };

        // The permit moves into the blocking task so an abandoned request
        // still counts against the limit until its generation finishes.
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::ServiceUnavailable(self.loader.state()))?;

        let model = handle.shared_model();
        let text = request.text.clone();
        let max_input_tokens = self.limits.max_input_tokens;
        let paraphrases = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_generation(model.as_ref(), &text, max_input_tokens, &params)
        })
        .await
        .map_err(|e| Error::GenerationFailed(format!("generation task aborted: {e}")))?
        .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        if paraphrases.len() != request.num_return_sequences {
            return Err(Error::GenerationFailed(format!(
                "model returned {} sequences, expected {}",
                paraphrases.len(),
                request.num_return_sequences
            )));
        }

        Ok(ParaphraseResult {
            original_text: request.text,
            paraphrases,
            device: handle.device().as_str().to_string(),
        })
    }
}

/// Encode, generate and decode, in model order.
fn run_generation(
    model: &dyn TextGenerationModel,
    text: &str,
    max_input_tokens: usize,
    params: &GenerationParams,
) -> anyhow::Result<Vec<String>> {
    let input_ids = model.encode(text, max_input_tokens)?;
    debug!(
        model = model.name(),
        input_tokens = input_ids.len(),
        num_beams = params.num_beams,
        "Running generation"
    );
    let sequences = model.generate(&input_ids, params)?;
    sequences
        .iter()
        .map(|sequence| model.decode(sequence))
        .collect()
}
