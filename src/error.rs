//! Error types and result handling for jmcosmos operations.
//!
//! All fallible operations return a [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. The first four variants of [`Error`] form the
//! reportable taxonomy a chat host is expected to branch on; the rest wrap
//! lower-level failures.
//!
use std::path::PathBuf;

use crate::types::ContentId;

/// Type alias for Results with jmcosmos errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all jmcosmos operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No sub-directory of the download root holds images for the content.
    #[error("No directory located for content {content_id} under '{download_root:?}'")]
    NotFound {
        content_id: ContentId,
        download_root: PathBuf,
    },
    /// A directory was chosen but it holds no usable images.
    #[error("Directory '{directory:?}' is present but holds no images")]
    EmptySet { directory: PathBuf },
    /// An image could not be read or decoded while assembling.
    #[error("Source image '{path:?}' could not be embedded: {reason}")]
    CorruptSource { path: PathBuf, reason: String },
    /// The assembled document is larger than the configured ceiling.
    #[error("Assembled document is {size} bytes, exceeding the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The given content identifier is not a positive decimal number
    #[error("Invalid content id '{0}': expected up to 10 decimal digits")]
    InvalidContentId(String),
    /// Error for invalid file or directory paths
    #[error("The given path '{0:?}' is invalid: {1}")]
    InvalidPath(PathBuf, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Semaphore(#[from] tokio::sync::AcquireError),
    #[error(transparent)]
    ConfigBuilder(#[from] crate::cosmos::CosmosConfigBuilderError),
    /// Error for failed asynchronous tasks
    #[error("Asynchronous task failed: {0}")]
    AsyncTaskError(String),
    /// Error for unsupported operations or formats (e.g., unknown image extension)
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error belongs to the reportable taxonomy
    /// (`NotFound`, `EmptySet`, `CorruptSource`, `TooLarge`).
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::EmptySet { .. }
                | Error::CorruptSource { .. }
                | Error::TooLarge { .. }
        )
    }

    /// Wraps a failure raised while embedding `path` as `CorruptSource`.
    /// Errors that already carry a taxonomy meaning pass through unchanged.
    pub(crate) fn corrupt_source(path: &std::path::Path, error: Error) -> Error {
        match error {
            Error::CorruptSource { .. } | Error::TooLarge { .. } => error,
            other => Error::CorruptSource {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Error::Other(error.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
