use std::io;
use thiserror::Error;

/// Result type for embedfs operations
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Unified error type for all embedfs operations
#[derive(Debug, Error)]
pub enum EmbedError {
    // Store errors
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    // Handle errors
    #[error("Invalid handle operation: {0}")]
    InvalidHandle(String),

    #[error("End of directory")]
    EndOfDirectory,

    // Serving errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Manifest errors
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Integrity check failed for {path}: {reason}")]
    IntegrityFailed { path: String, reason: String },

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(String),
}

impl EmbedError {
    /// True for a missing store entry or a missing local-mode file
    pub fn is_not_found(&self) -> bool {
        match self {
            EmbedError::NotFound(_) => true,
            EmbedError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True for permission failures, including local-mode access errors
    pub fn is_permission_denied(&self) -> bool {
        match self {
            EmbedError::PermissionDenied(_) => true,
            EmbedError::Io(err) => err.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    pub(crate) fn closed() -> Self {
        EmbedError::InvalidHandle("file already closed".to_string())
    }
}

impl From<toml::de::Error> for EmbedError {
    fn from(err: toml::de::Error) -> Self {
        EmbedError::TomlError(err.to_string())
    }
}

impl From<toml::ser::Error> for EmbedError {
    fn from(err: toml::ser::Error) -> Self {
        EmbedError::TomlError(err.to_string())
    }
}

impl From<EmbedError> for io::Error {
    fn from(err: EmbedError) -> io::Error {
        let kind = match &err {
            EmbedError::Io(inner) => return io::Error::new(inner.kind(), err.to_string()),
            EmbedError::NotFound(_) => io::ErrorKind::NotFound,
            EmbedError::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            EmbedError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            EmbedError::EndOfDirectory => io::ErrorKind::UnexpectedEof,
            EmbedError::InvalidHandle(_)
            | EmbedError::NotADirectory(_)
            | EmbedError::IsADirectory(_) => io::ErrorKind::InvalidInput,
            EmbedError::DecompressionFailed(_) | EmbedError::IntegrityFailed { .. } => {
                io::ErrorKind::InvalidData
            }
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(EmbedError::NotFound("/a".into()).is_not_found());
        assert!(EmbedError::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!EmbedError::closed().is_not_found());

        assert!(EmbedError::PermissionDenied("/".into()).is_permission_denied());
        assert!(
            EmbedError::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_permission_denied()
        );
    }

    #[test]
    fn test_io_error_kinds() {
        let err: io::Error = EmbedError::NotFound("/missing".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = EmbedError::closed().into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err: io::Error = EmbedError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
