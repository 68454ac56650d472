use super::ErrorKind;
use crate::core::StoreError;
use chrono::{DateTime, Utc};
use std::fmt;

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Classified failure returned by every record-store operation.
///
/// Built once at the failure site and propagated verbatim. Callers branch on
/// [`AppError::kind`], never on the message text.
#[derive(Debug, Clone, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub cause: Option<StoreError>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: kind.status_code(),
            timestamp: Utc::now(),
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn with_cause(mut self, cause: StoreError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Classifies a raw storage failure.
    pub fn parse(err: StoreError) -> Self {
        let kind = classify_store_error(&err);
        Self::new(kind, err.to_string()).with_cause(err)
    }
}

/// Maps a raw storage error to its taxonomy kind.
pub fn classify_store_error(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::InvalidPatch(_)
        | StoreError::InvalidInput(_)
        | StoreError::ForeignKeyViolation { .. } => ErrorKind::Validation,
        StoreError::UniqueViolation { .. }
        | StoreError::VersionMismatch { .. }
        | StoreError::RetriesExhausted { .. } => ErrorKind::Conflict,
        StoreError::NotFound { .. } => ErrorKind::NotFound,
        StoreError::Timeout(_)
        | StoreError::VersionOverflow { .. }
        | StoreError::Connection(_)
        | StoreError::TransactionClosed(_)
        | StoreError::LockError(_)
        | StoreError::IoError(_)
        | StoreError::Serialization(_) => ErrorKind::Database,
    }
}

/// Classifies any failure into an [`AppError`].
///
/// An `AppError` passes through untouched, a [`StoreError`] anywhere in the
/// error chain is classified by its variant, and anything else is `DATABASE`.
pub fn parse_error<E>(raw: E) -> AppError
where
    E: Into<anyhow::Error>,
{
    let raw: anyhow::Error = raw.into();

    for cause in raw.chain() {
        if let Some(app) = cause.downcast_ref::<AppError>() {
            return app.clone();
        }
        if let Some(store) = cause.downcast_ref::<StoreError>() {
            return AppError::parse(store.clone());
        }
    }

    AppError::database(format!("{:#}", raw))
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::parse(err)
    }
}
