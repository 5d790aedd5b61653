//! Error types for blockip.
//!
//! Core modules return [`BipError`]; the command layer wraps it in
//! `anyhow` and `main` maps it back to a process exit code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BipError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, BipError>;

impl BipError {
    /// Process exit code reported for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BipError::InvalidArgument(_) => 2,
            BipError::PermissionDenied(_) => 3,
            BipError::File(_) => 4,
            BipError::Network(_) => 5,
        }
    }

    pub(crate) fn file(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        BipError::File(format!("{}: {}", context, err))
    }
}

impl From<std::io::Error> for BipError {
    fn from(err: std::io::Error) -> Self {
        BipError::File(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            BipError::InvalidArgument(String::new()).exit_code(),
            BipError::PermissionDenied(String::new()).exit_code(),
            BipError::File(String::new()).exit_code(),
            BipError::Network(String::new()).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_io_error_maps_to_file() {
        let err: BipError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, BipError::File(_)));
        assert!(err.to_string().contains("gone"));
    }
}
