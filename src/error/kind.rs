use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure kinds every caller of the store handles.
///
/// Each kind maps to a fixed HTTP-style status code. Adding a variant is a
/// breaking change for callers that match exhaustively, which is the point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input or a referential (foreign-key) violation.
    Validation,
    /// Uniqueness violation or optimistic-version mismatch.
    Conflict,
    /// The referenced record is absent.
    NotFound,
    /// Every other storage failure: timeouts, connectivity, I/O.
    Database,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Database => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Database => "DATABASE",
        }
    }

    /// `true` when the failure is the caller's to fix (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(ErrorKind::Validation.status_code(), 400);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Database.status_code(), 500);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&ErrorKind::NotFound).unwrap(), "\"NOT_FOUND\"");
        let kind: ErrorKind = serde_json::from_str("\"CONFLICT\"").unwrap();
        assert_eq!(kind, ErrorKind::Conflict);
        assert!(!ErrorKind::Database.is_client_error());
    }
}
