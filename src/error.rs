use crate::models::ReadinessState;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by the paraphrasing core. Each variant maps to one
/// stable HTTP status in [`crate::errors::AppError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Text cannot be empty")]
    RejectedEmpty,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Model not loaded (state: {0})")]
    ServiceUnavailable(ReadinessState),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Error during paraphrasing: {0}")]
    GenerationFailed(String),
}
