pub mod beam_search;
pub mod loader;
pub mod t5;
pub mod traits;

pub use loader::{ModelHandle, ModelLoader, ReadinessState, RetryPolicy};
pub use t5::{HubModelSource, HubSettings, T5Paraphraser};
pub use traits::{
    FetchError, GenerationParams, ModelSource, SharedModel, TextGenerationModel,
};
