use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to parse symbols for image {image_path}: {reason}")]
    BackendFailure { image_path: String, reason: String },

    #[error("module not loaded: {0}")]
    ModuleNotLoaded(String),
}
