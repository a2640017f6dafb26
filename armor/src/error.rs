use std::sync::PoisonError;
use crossbeam::channel::{RecvError, SendError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArmorError {

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Recv: {0}")]
    RecvError(#[from] RecvError),

    #[error("backend error at {path}: {message}")]
    Backend { path: String, message: String },

    #[error("corrupted data at {path}: {message}")]
    Corrupted { path: String, message: String },

    #[error("entity offset violation in {shard} column {column} for entity {entity}: {message}")]
    EntityOffset { shard: String, column: String, entity: String, message: String },

    #[error("write transaction conflict: {0}")]
    WriteTransaction(String),

    #[error("entity id of {table} must be {expected} but got {actual}")]
    EntityIdTypeMismatch { table: String, expected: char, actual: char },

    #[error("column {column} of {shard} is typed {expected} but got {actual}")]
    ColumnTypeMismatch { shard: String, column: String, expected: char, actual: char },

    #[error("shard writer {0} is closed")]
    ShardClosed(String),

    #[error("execution failed: {0}")]
    Execution(#[source] Box<ArmorError>),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ArmorError {
    pub fn backend(path: impl Into<String>, message: impl ToString) -> Self {
        ArmorError::Backend { path: path.into(), message: message.to_string() }
    }

    pub fn corrupted(path: impl Into<String>, message: impl ToString) -> Self {
        ArmorError::Corrupted { path: path.into(), message: message.to_string() }
    }

    /// Races with a concurrent close: the shard was released elsewhere, nothing to publish.
    pub fn is_benign(&self) -> bool {
        match self {
            ArmorError::ShardClosed(_) => true,
            ArmorError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Categories handed back to callers as-is instead of being wrapped into `Execution`.
    pub fn is_recognized(&self) -> bool {
        matches!(
            self,
            ArmorError::EntityOffset { .. } | ArmorError::WriteTransaction(_) | ArmorError::EntityIdTypeMismatch { .. }
        )
    }

    pub fn is_entity_offset(&self) -> bool {
        matches!(self, ArmorError::EntityOffset { .. })
    }

    /// Keeps recognized categories, wraps everything else.
    pub fn into_surfaced(self) -> Self {
        match self {
            e if e.is_recognized() => e,
            e @ ArmorError::Execution(_) => e,
            e => ArmorError::Execution(Box::new(e)),
        }
    }
}

impl<T> From<SendError<T>> for ArmorError
{
    fn from(e: SendError<T>) -> Self {
        ArmorError::Custom(format!("send error: {:?}", e.to_string()))
    }
}

impl<T> From<PoisonError<T>> for ArmorError
{
    fn from(e: PoisonError<T>) -> Self {
        ArmorError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}
