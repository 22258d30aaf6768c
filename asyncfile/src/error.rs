//! Error taxonomy for file handles and their streams.
//!
//! Misuse of a handle (`InvalidArgument`, `IllegalState`,
//! `ContextViolation`) is reported synchronously by the call that caused
//! it. Environmental failures (`OpenFailure` aside) are reported through
//! the result callback of the operation that triggered them.

use crate::runtime::context::ContextId;

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = FileError> = std::result::Result<T, E>;

/// The native operation that produced an [`FileError::Io`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Flush,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Flush => "flush",
            Operation::Close => "close",
        };

        f.write_str(name)
    }
}

/// Errors produced by [`AsyncFile`](crate::fs::AsyncFile) and its streams.
#[derive(Debug, Error)]
pub enum FileError {
    /// Bad open parameters.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the arguments.
        reason: String,
    },

    /// The operating system refused to open the file.
    #[error("failed to open {}: {source}", path.display())]
    OpenFailure {
        /// Path that was being opened.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The handle has been closed.
    #[error("file handle is closed")]
    IllegalState,

    /// The handle was used outside the context that created it.
    #[error("file handle must only be used on the context that created it (expected {expected:?}, actual {actual:?})")]
    ContextViolation {
        /// Context that owns the handle, if one was required.
        expected: Option<ContextId>,
        /// Context the call was made from.
        actual: Option<ContextId>,
    },

    /// A native read, write, flush or close failed.
    #[error("{op} failed: {source}")]
    Io {
        /// The failed operation.
        op: Operation,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A stream failure nobody registered a handler for.
    #[error("unhandled stream failure: {0}")]
    Unhandled(#[source] Box<FileError>),
}

impl FileError {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        FileError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(op: Operation, source: io::Error) -> Self {
        FileError::Io { op, source }
    }

    /// Returns the OS error kind for [`Io`](Self::Io) and
    /// [`OpenFailure`](Self::OpenFailure) errors.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            FileError::Io { source, .. } | FileError::OpenFailure { source, .. } => {
                Some(source.kind())
            }
            FileError::Unhandled(inner) => inner.io_kind(),
            _ => None,
        }
    }
}
