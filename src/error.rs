use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed archive: {reason}")]
    Format { reason: String },

    #[error("checksum mismatch for `{name}`: expected {expected}, got {actual}")]
    Checksum {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("destination `{}` already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("stream ended after {read} of {expected} bytes")]
    Truncated { expected: u64, read: u64 },

    #[error("unexpected HTTP status {status} for `{url}`")]
    Http { status: u16, url: String },

    #[error("request to `{url}` failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to initialize HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("operation canceled")]
    Canceled,

    #[error("no entry named `{name}` in archive")]
    EntryNotFound { name: String },

    #[error("unknown version `{version}`; available versions are {available:?}")]
    UnknownVersion {
        version: String,
        available: Vec<&'static str>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(reason: impl Into<String>) -> Error {
        Error::Format {
            reason: reason.into(),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match &e {
            Error::Format { .. } | Error::Checksum { .. } => ErrorKind::InvalidData,
            Error::Truncated { .. } => ErrorKind::UnexpectedEof,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Canceled => ErrorKind::Interrupted,
            Error::EntryNotFound { .. } => ErrorKind::NotFound,
            Error::Io(_)
            | Error::Http { .. }
            | Error::Network { .. }
            | Error::HttpClient(_)
            | Error::UnknownVersion { .. } => ErrorKind::Other,
        };
        std::io::Error::new(kind, e)
    }
}

/// Recover a typed error that was tunneled through an `std::io::Error` by a
/// `Read` adapter, so callers see `Error::Checksum` instead of `Error::Io`.
pub(crate) fn from_io(e: std::io::Error) -> Error {
    if e.get_ref().map_or(false, |r| r.is::<Error>()) {
        if let Some(Ok(inner)) = e.into_inner().map(|b| b.downcast::<Error>()) {
            return *inner;
        }
        return Error::format("lost error context");
    }
    Error::Io(e)
}
