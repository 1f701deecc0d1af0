pub mod api;
pub mod config;
pub mod error;
pub mod errors;
pub mod gpu_detection;
pub mod health;
pub mod models;
pub mod service;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use errors::AppError;
pub use health::{HealthReporter, HealthSnapshot};
pub use service::{ParaphraseRequest, ParaphraseResult, ParaphraseService};
pub use validation::TextValidator;
