use std::fmt::Display;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure surfaced by a storager operation.
///
/// Backend adapters normalize known conditions into one of the kinds below and
/// wrap everything else in [`Error::Unhandled`]. Public operations add call
/// context with [`Error::context`], so the innermost kind is reached through
/// [`Error::kind`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("segment {0} is not initiated")]
    SegmentNotInitiated(String),

    #[error("segment {0} has no parts")]
    SegmentPartsEmpty(String),

    #[error("storage class {0:?} is not supported")]
    StorageClassNotSupported(String),

    #[error("{0} is not supported by this service")]
    CapabilityNotSupported(&'static str),

    #[error("invalid option {key}: {reason}")]
    Validation { key: &'static str, reason: String },

    #[error("object {0} does not exist")]
    ObjectNotExist(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("unhandled backend error: {0:#}")]
    Unhandled(anyhow::Error),

    #[error("{service} {op} [{path}]: {source}")]
    Operation {
        service: String,
        op: &'static str,
        path: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn validation(key: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            key,
            reason: reason.into(),
        }
    }

    /// Wrap a raw backend or I/O error, keeping it reachable for inspection.
    pub fn unhandled<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Unhandled(anyhow::Error::new(err))
    }

    pub fn unhandled_msg(msg: impl Display) -> Self {
        Error::Unhandled(anyhow::anyhow!("{msg}"))
    }

    /// Attach the failing operation and its target (path or segment id).
    pub fn context(self, service: impl Display, op: &'static str, path: impl Into<String>) -> Self {
        Error::Operation {
            service: service.to_string(),
            op,
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all operation context peeled off.
    pub fn kind(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.kind(),
            other => other,
        }
    }

    pub fn is_segment_not_initiated(&self) -> bool {
        matches!(self.kind(), Error::SegmentNotInitiated(_))
    }

    pub fn is_segment_parts_empty(&self) -> bool {
        matches!(self.kind(), Error::SegmentPartsEmpty(_))
    }

    pub fn is_storage_class_not_supported(&self) -> bool {
        matches!(self.kind(), Error::StorageClassNotSupported(_))
    }

    pub fn is_capability_not_supported(&self) -> bool {
        matches!(self.kind(), Error::CapabilityNotSupported(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind(), Error::Validation { .. })
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self.kind(), Error::ObjectNotExist(_))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.kind(), Error::DeadlineExceeded)
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self.kind(), Error::Unhandled(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::unhandled(err)
    }
}
