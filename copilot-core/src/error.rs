use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse catalog {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{0}")]
    Precondition(&'static str),

    #[error("payload.{0} is required")]
    MissingField(&'static str),

    #[error("translation backend error: {0}")]
    Backend(String),

    #[error("cannot export \"{key}\": plural index {index} has no msgstr slot")]
    ExportCoercion { key: String, index: u32 },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no entry at index {0}")]
    EntryIndex(usize),

    #[error("entry \"{key}\" was removed from the new catalog")]
    EntryDeleted { key: String },

    #[error("invalid plural index in line: {line}")]
    InvalidPluralEdit { line: String },

    #[error("invalid project snapshot: {0}")]
    Snapshot(String),

    #[error("invalid settings: {0}")]
    Settings(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        EngineError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
