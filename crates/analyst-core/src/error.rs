use analyst_codegen::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("unsupported dataset file type: {0}")]
    UnsupportedFileType(String),

    #[error("could not parse dataset: {0}")]
    DatasetParse(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalystError>;
