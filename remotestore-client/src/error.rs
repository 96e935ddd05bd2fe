use reqwest::StatusCode;

/// Errors that can happen within the remotestore client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// IO errors related to payload streaming.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Errors related to UTF-8 decoding.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    /// Errors decoding JSON from a backend response or an object's content.
    #[error("failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Errors parsing multipart form data.
    #[error("failed to parse form data: {0}")]
    Multipart(#[from] multer::Error),
    /// The requested object does not exist.
    #[error("object not found: {path}")]
    NotFound {
        /// The path of the object, as resolved by the backend.
        path: String,
    },
    /// The backend rejected the request.
    #[error("{backend} error ({status}): {message}")]
    Backend {
        /// The name of the backend that reported the error.
        backend: &'static str,
        /// The HTTP status of the response.
        status: StatusCode,
        /// The error summary reported by the backend.
        message: String,
    },
    /// A response lacks a header that is required to describe the object.
    #[error("missing response header `{header}`")]
    MissingHeader {
        /// The name of the header.
        header: &'static str,
    },
    /// A response header could not be parsed.
    #[error("invalid response header `{header}`")]
    InvalidHeader {
        /// The name of the header.
        header: &'static str,
    },
    /// The path does not name an object.
    #[error("invalid object path {path:?}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },
    /// Error when URL manipulation fails.
    #[error("{message}")]
    InvalidUrl {
        /// The URL error message.
        message: String,
    },
    /// The operation is not supported for this object or backend.
    #[error("unsupported: {message}")]
    Unsupported {
        /// Describes what is not supported.
        message: String,
    },
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
