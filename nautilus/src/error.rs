//! Rejection taxonomy for requests that reach the supervisor.
//!
//! Every rejection carries a stable machine-readable code (`as_str`) so callers
//! can show the reason category without leaking internal detail.

use thiserror::Error;

/// Why a request failed the origin or token checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("origin header does not match host")]
    OriginMismatch,
    #[error("referer header does not match host")]
    RefererMismatch,
    #[error("token missing, invalid, or already used")]
    InvalidToken,
}

impl AuthRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRejection::OriginMismatch => "origin_mismatch",
            AuthRejection::RefererMismatch => "referer_mismatch",
            AuthRejection::InvalidToken => "invalid_token",
        }
    }
}

/// Why a payload path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path must be absolute")]
    NotAbsolute,
    #[error("path must not contain parent-directory segments")]
    Traversal,
    #[error("path is outside the payload directory")]
    OutsideRoot,
    #[error("path does not name the payload entry script")]
    WrongEntry,
    #[error("payload entry script does not exist")]
    Missing,
}

impl PathRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathRejection::NotAbsolute => "not_absolute",
            PathRejection::Traversal => "traversal",
            PathRejection::OutsideRoot => "outside_root",
            PathRejection::WrongEntry => "wrong_entry",
            PathRejection::Missing => "missing",
        }
    }
}

/// Why a prompt answer was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseRejection {
    #[error("response contains characters outside the safe set")]
    UnsafeCharacter,
    #[error("response is longer than {max} characters")]
    TooLong { max: usize },
}

impl ResponseRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseRejection::UnsafeCharacter => "unsafe_character",
            ResponseRejection::TooLong { .. } => "too_long",
        }
    }
}

/// Failure of a single request. Never affects the next request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("auth rejected: {0}")]
    AuthRejected(#[from] AuthRejection),
    #[error("path rejected: {0}")]
    PathRejected(#[from] PathRejection),
    #[error("response rejected: {0}")]
    ValidationRejected(#[from] ResponseRejection),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RequestError {
    /// Reason category reported to clients.
    pub fn category(&self) -> &'static str {
        match self {
            RequestError::AuthRejected(_) => "auth_rejected",
            RequestError::PathRejected(_) => "path_rejected",
            RequestError::ValidationRejected(_) => "validation_rejected",
            RequestError::Internal(_) => "internal",
        }
    }

    /// Stable reason code within the category.
    pub fn reason(&self) -> &'static str {
        match self {
            RequestError::AuthRejected(r) => r.as_str(),
            RequestError::PathRejected(r) => r.as_str(),
            RequestError::ValidationRejected(r) => r.as_str(),
            RequestError::Internal(_) => "internal_error",
        }
    }
}
