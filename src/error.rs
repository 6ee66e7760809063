//! Error kinds surfaced by request processing
//!
//! Validation-stage errors (`SuspiciousOperation`, `UntrustedHost`) abort the
//! request. Streaming and upload errors are returned to the dispatcher, which
//! picks the status code shown to the client.

use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use hyper::StatusCode;
use thiserror::Error;

/// Typed failure of a request-scoped operation
#[derive(Debug, Error)]
pub enum HttpError {
    /// A host or scheme assertion that cannot be parsed or is malformed
    #[error("SuspiciousOperation: Invalid Host {value} with ip({ip})")]
    SuspiciousOperation { value: String, ip: IpAddr },

    /// A syntactically valid host that the trust policy does not allow
    #[error("SuspiciousOperation: Untrusted Host {value} with ip({ip})")]
    UntrustedHost { value: String, ip: IpAddr },

    /// The resource does not exist or resolved to a directory
    #[error("Not Found: {0}")]
    NotFound(String),

    /// Malformed client input or a client that went away mid-response
    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// `If-Match` / `If-Unmodified-Since` did not hold
    #[error("Precondition Failed")]
    PreconditionFailed,

    /// Unexpected I/O failure or an exceeded size limit
    #[error("Internal Server Error: {message}")]
    InternalServerError {
        message: String,
        #[source]
        cause: Option<io::Error>,
    },

    /// Writing an upload to temporary storage failed
    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HttpError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalServerError {
            message: message.into(),
            cause: None,
        }
    }

    pub fn internal_io(message: impl Into<String>, cause: io::Error) -> Self {
        Self::InternalServerError {
            message: message.into(),
            cause: Some(cause),
        }
    }

    /// Status code the dispatcher answers with for this error
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::SuspiciousOperation { .. } | Self::UntrustedHost { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::InternalServerError { .. } | Self::Filesystem { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the failure was caused by the client rather than the server
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_value_and_ip() {
        let ip: IpAddr = "192.168.1.1".parse().unwrap();
        let err = HttpError::SuspiciousOperation {
            value: "invalid_hostname".to_string(),
            ip,
        };
        assert_eq!(
            err.to_string(),
            "SuspiciousOperation: Invalid Host invalid_hostname with ip(192.168.1.1)"
        );

        let err = HttpError::UntrustedHost {
            value: "untrusted.com".to_string(),
            ip,
        };
        assert_eq!(
            err.to_string(),
            "SuspiciousOperation: Untrusted Host untrusted.com with ip(192.168.1.1)"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(HttpError::NotFound("/x".into()).status_code(), 404);
        assert_eq!(HttpError::BadRequest("aborted".into()).status_code(), 400);
        assert_eq!(HttpError::internal("boom").status_code(), 500);
        assert_eq!(HttpError::PreconditionFailed.status_code(), 412);
        let fs = HttpError::Filesystem {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::other("EIO"),
        };
        assert_eq!(fs.status_code(), 500);
        assert!(!fs.is_client_error());
        assert!(HttpError::NotFound(String::new()).is_client_error());
    }
}
