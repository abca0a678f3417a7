use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnealError>;

#[derive(Error, Debug)]
pub enum AnnealError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),
}
