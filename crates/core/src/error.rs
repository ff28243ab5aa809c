use thiserror::Error;

/// Engine errors for the sampling core
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "linux_procfs")]
    #[error("Procfs error: {0}")]
    Procfs(#[from] procfs::ProcError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn sampler<S: Into<String>>(msg: S) -> Self {
        Self::Sampler(msg.into())
    }
}
