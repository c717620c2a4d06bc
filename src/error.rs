use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::PatientId;

/// Failure reported by a storage collaborator (session, entity lookup).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Cohort query failures: bad predicate arguments or a storage failure while executing.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{operation}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} failed ({context}): {source}")]
    Storage {
        operation: &'static str,
        context: String,
        #[source]
        source: StorageError,
    },
}

/// Failures while assembling or serializing a clinical record.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export of patient {patient_id} failed while {stage}: {source}")]
    Storage {
        patient_id: PatientId,
        stage: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("export of patient {patient_id} failed: {reason}")]
    MissingReference { patient_id: PatientId, reason: String },

    #[error("export of patient {patient_id} failed to serialize: {source}")]
    Serialize {
        patient_id: PatientId,
        #[source]
        source: SerializeError,
    },

    #[error("export of patient set failed to serialize: {source}")]
    SerializeSet {
        #[source]
        source: SerializeError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("failed to write XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to convert XML to UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("patient {0} not found")]
    NotFound(PatientId),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, kind, diagnostics) = match &self {
            Error::Query(QueryError::InvalidArgument { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid-query", self.to_string())
            }
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not-found", self.to_string()),
            Error::Query(QueryError::Storage { operation, .. }) => {
                tracing::error!(error = %self, "Cohort query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "query-failed",
                    format!("{} failed", operation),
                )
            }
            Error::Export(ExportError::MissingReference { .. }) => {
                tracing::error!(error = %self, "Record export hit inconsistent data");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "export-failed",
                    self.to_string(),
                )
            }
            Error::Export(_) => {
                tracing::error!(error = %self, "Record export failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "export-failed",
                    "Record export failed".to_string(),
                )
            }
            Error::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "exception",
                "Internal server error".to_string(),
            ),
        };

        (status, Json(error_body(kind, &diagnostics))).into_response()
    }
}

pub fn error_body(kind: &str, diagnostics: &str) -> serde_json::Value {
    json!({
        "error": kind,
        "diagnostics": diagnostics
    })
}

pub type Result<T> = std::result::Result<T, Error>;
