use uuid::Uuid;

/// Errors returned by the scheduling engine and its stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input shape. Nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// A write targeted a record that does not exist in the caller's scope.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// The backing store rejected or could not complete an operation.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn task_not_found(id: Uuid) -> Self {
        Error::NotFound { kind: "task", id }
    }

    pub fn block_not_found(id: Uuid) -> Self {
        Error::NotFound { kind: "focus block", id }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
