//! Error types for sampling, job handling and extraction.

use thiserror::Error;

/// Result alias used throughout `certiq-core`.
pub type Result<T> = std::result::Result<T, RngError>;

/// Errors raised by the certified randomness client.
#[derive(Error, Debug)]
pub enum RngError {
    /// A caller-supplied argument is out of range or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend refused or failed to execute a request.
    #[error("Backend '{backend}' error: {message}")]
    Backend {
        /// Backend name.
        backend: String,
        /// What went wrong.
        message: String,
    },

    /// A submitted job finished in an error state.
    #[error("Job {job_id} failed: {message}")]
    Job {
        /// Job identifier.
        job_id: String,
        /// Failure reason.
        message: String,
    },

    /// No job with this identifier is known to the backend.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The requested action is not permitted for this backend or caller.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// The sampled data cannot certify any randomness under the given bounds.
    #[error("Insufficient randomness: {0}")]
    InsufficientRandomness(String),

    /// The weak source of randomness could not produce bits.
    #[error("WSR generator failed: {0}")]
    Wsr(String),

    /// Extractor parameters are inconsistent or unusable.
    #[error("Invalid extractor parameters: {0}")]
    InvalidExtractorParams(String),

    /// Filesystem error (checkpoints, configuration).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RngError {
    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a job failure error.
    pub fn job(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            job_id: job_id.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RngError::backend("ibmq_valencia", "too many shots");
        assert!(err.to_string().contains("ibmq_valencia"));
        assert!(err.to_string().contains("too many shots"));

        let err = RngError::job("job-1", "cancelled");
        assert_eq!(err.to_string(), "Job job-1 failed: cancelled");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RngError = io.into();
        assert!(matches!(err, RngError::Io(_)));
    }
}
