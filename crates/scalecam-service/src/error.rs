//! Replication error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while replicating from a remote store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The remote could not be reached or answered with an error status.
    #[error("Remote {url} unavailable: {reason}")]
    RemoteUnavailable { url: String, reason: String },

    /// The remote answered, but not in the expected shape.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// Local store failure, including rejected batches.
    #[error(transparent)]
    Store(#[from] scalecam_store::Error),

    /// Writing a downloaded clip failed.
    #[error("Failed to write {path}: {source}")]
    ClipWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The external transcoder failed.
    #[error("Transcoding {path} failed: {reason}")]
    Transcode { path: PathBuf, reason: String },

    /// A replication pass took longer than its tick allows.
    #[error("Replication of {store} timed out after {secs}s")]
    TickTimeout { store: String, secs: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::RemoteUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::MalformedResponse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the next scheduled pass can be expected to succeed.
    ///
    /// A malformed response or a bad clip name will repeat until the remote
    /// is fixed, so those are worth a louder log line.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnavailable { .. } | Error::TickTimeout { .. } | Error::Io(_)
        ) || matches!(self, Error::Store(e) if e.is_retryable())
    }
}

/// Result type for replication.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::unavailable("http://cats.local:8000/", "connection refused");
        assert_eq!(
            err.to_string(),
            "Remote http://cats.local:8000/ unavailable: connection refused"
        );

        let err = Error::malformed("http://cats.local:8000/clips", "missing filename");
        assert!(err.to_string().contains("missing filename"));
    }

    #[test]
    fn test_is_transient() {
        assert!(Error::unavailable("u", "down").is_transient());
        assert!(!Error::malformed("u", "bad").is_transient());
        assert!(
            !Error::Store(scalecam_store::Error::BatchWrite {
                row: 0,
                reason: "config_id must be positive".into()
            })
            .is_transient()
        );
    }
}
