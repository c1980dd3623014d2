use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Archive-level failures.
///
/// Anything that prevents an operation from starting (or from finishing its
/// structural work) is reported through this type. Problems with a single
/// entry during `add`/`extract` are not errors; they are recorded in that
/// entry's [`EntryStatus`](crate::EntryStatus).
#[derive(Debug, Error)]
pub enum ZipError {
    /// Bad or missing signature, truncated record, inconsistent sizes.
    #[error("invalid archive format: {0}")]
    Format(String),

    /// Open/read/write/rename failure on the underlying filesystem.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Unsupported or conflicting option, missing selection rule.
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// A path supplied by the caller does not exist.
    #[error("no such file or directory: '{}'", .0.display())]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ZipError>;

impl ZipError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ZipError::Format(msg.into())
    }

    pub(crate) fn parameter(msg: impl Into<String>) -> Self {
        ZipError::Parameter(msg.into())
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}

/// Attach the offending path to an I/O failure.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| ZipError::Io {
            source,
            path: path.to_path_buf(),
        })
    }
}
