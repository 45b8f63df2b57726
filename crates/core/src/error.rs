use thiserror::Error;

#[derive(Error, Debug)]
pub enum OikosError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for OikosError {
    fn from(e: serde_json::Error) -> Self {
        OikosError::Serialize(e.to_string())
    }
}
