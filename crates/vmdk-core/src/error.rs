//! Error types for the vmdk-core library.

use std::path::PathBuf;

/// The main error type for VMDK operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// The input is neither a textual descriptor nor a valid hosted-sparse header.
    #[error("not a VMDK file")]
    NotAVmdk,

    /// The caller misused an API: wrong create-type for the entry point, a
    /// filename missing the `.vmdk` suffix, an unknown create-type string, etc.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A recognized extent type with no implementation behind it.
    #[error("unsupported extent type: {message}")]
    UnsupportedExtentType { message: String },

    /// A recognized create-type with no implementation behind it.
    #[error("unsupported create type: {message}")]
    UnsupportedCreateType { message: String },

    /// On-disk header or descriptor fields are self-inconsistent.
    #[error("corrupt VMDK structure: {message}")]
    Corrupt { message: String },

    /// Catch-all for descriptor text parse errors.
    #[error("VMDK error: {message}")]
    Vmdk { message: String },
}

/// A specialized Result type for vmdk-core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unsupported-extent-type error.
    pub fn unsupported_extent_type(message: impl Into<String>) -> Self {
        Self::UnsupportedExtentType {
            message: message.into(),
        }
    }

    /// Create an unsupported-create-type error.
    pub fn unsupported_create_type(message: impl Into<String>) -> Self {
        Self::UnsupportedCreateType {
            message: message.into(),
        }
    }

    /// Create a corrupt-structure error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Create a VMDK descriptor parse error.
    pub fn vmdk(message: impl Into<String>) -> Self {
        Self::Vmdk {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}
