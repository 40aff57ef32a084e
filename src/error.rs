use thiserror::Error;

use crate::backend::BackendError;

/// Error surfaced by every hook operation. Callers branch on the variant
/// instead of parsing messages; `Display` yields the user-facing text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Empresa não selecionada")]
    TenantMissing,

    #[error("{message}")]
    ValidationFailed { field: String, message: String },

    /// A uniqueness rule enforced by the backend rejected the write.
    #[error("{field} já cadastrado")]
    Conflict { field: String },

    #[error("{entity} {id} não encontrado")]
    NotFound { entity: String, id: String },

    #[error("backend error {code}: {message}")]
    BackendError { code: String, message: String },

    #[error("backend unreachable: {0}")]
    NetworkError(String),

    #[error("row from {table} does not match the expected shape: {message}")]
    Decode { table: String, message: String },
}

impl SyncError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        SyncError::ValidationFailed {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        SyncError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// True for failures the user can fix by changing input or selection.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::TenantMissing
                | SyncError::ValidationFailed { .. }
                | SyncError::Conflict { .. }
        )
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Rejected { code, message } => SyncError::BackendError { code, message },
            BackendError::Conflict { column, .. } => SyncError::Conflict { field: column },
            BackendError::Unavailable(message) => SyncError::NetworkError(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
