use thiserror::Error;

pub type Result<T> = std::result::Result<T, PappusError>;

/// Errors raised by the pipeline stages. Every variant is fatal; a run either
/// completes all stages or stops at the first one that fails.
#[derive(Debug, Error)]
pub enum PappusError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Geometry error: {0}")]
    Geometry(String),
    #[error("Mesher error: {0}")]
    Mesher(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("Post Processor error: {0}")]
    PostProcessor(String),
}
