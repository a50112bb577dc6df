use thiserror::Error;

use kvbridge::StoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Database(#[from] kvbridge::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot write report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{engine}: value read back for {key} differs from the value written")]
    Mismatch { engine: &'static str, key: String },
}

pub type Result<T> = std::result::Result<T, CliError>;
