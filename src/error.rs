use std::path::PathBuf;

use thiserror::Error;

use crate::portals::Role;
use crate::services::store::Collection;

pub type Result<T> = std::result::Result<T, FestError>;

#[derive(Debug, Error)]
pub enum FestError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error on {collection}: {message}")]
    Store {
        collection: Collection,
        message: String,
    },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("role {role:?} may not {action}")]
    Forbidden { role: Role, action: &'static str },

    #[error("judging for program {program_id} is closed")]
    JudgingClosed { program_id: String },

    #[error("QR encoding failed for payload {payload:?}: {message}")]
    Qr { payload: String, message: String },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("spreadsheet export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("zip export failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl FestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FestError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn store(collection: Collection, message: impl Into<String>) -> Self {
        FestError::Store {
            collection,
            message: message.into(),
        }
    }
}
