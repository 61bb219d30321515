use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;

/// Error taxonomy for streaming JSON encoding (spec section 7).
///
/// All variants are fatal to the [`crate::encode::Encoder`] instance that
/// produced them: there is no local recovery. Once an error has been
/// observed the encoder transitions to a destroyed state and surfaces only
/// the first error (subsequent errors are suppressed).
#[derive(Debug, Error, Clone)]
pub enum EncodeError {
    /// A container value was already open on the frame stack when it was
    /// submitted again (section 8 property 3).
    #[error("circular structure detected at {path}")]
    CircularStructure { path: String },

    /// The classifier could not place a value and the primitive encoder
    /// does not accept it either.
    #[error("unsupported value encountered: {detail}")]
    UnsupportedType { detail: String },

    /// A `ByteStream`/`RecordStream` was already exhausted at submission.
    #[error("input stream was already exhausted before submission")]
    StreamEnded,

    /// A `ByteStream`/`RecordStream` was already in flowing/push mode (or
    /// already being read by another frame) at submission.
    #[error("input stream was already in flowing mode and cannot be consumed")]
    StreamStateInvalid,

    /// An input stream reported an error through its `Stream` impl.
    #[error("input stream error: {source}")]
    StreamError {
        #[source]
        source: Rc<dyn std::error::Error>,
    },

    /// A `Deferred` resolved with an error.
    #[error("deferred value was rejected: {source}")]
    DeferredRejected {
        #[source]
        source: Rc<dyn std::error::Error>,
    },

    /// The user-supplied replacer or `ToJson` hook returned an error.
    #[error("replacer or toJSON hook failed: {message}")]
    ReplacerFailure { message: String },

    /// I/O error with operation context (CLI use).
    #[error("{operation}{}: {source}", path.as_ref().map(|p| format!(" '{}'", p.display())).unwrap_or_default())]
    Io {
        operation: String,
        path: Option<PathBuf>,
        #[source]
        source: Rc<std::io::Error>,
    },

    /// Generic message, for cases with no dedicated variant.
    #[error("{message}")]
    Message { message: String },
}

pub type Result<T> = std::result::Result<T, EncodeError>;

impl EncodeError {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn circular_structure(path: impl Into<String>) -> Self {
        Self::CircularStructure { path: path.into() }
    }

    #[must_use]
    pub fn unsupported_type(detail: impl Into<String>) -> Self {
        Self::UnsupportedType {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn stream_error(source: impl std::error::Error + 'static) -> Self {
        Self::StreamError {
            source: Rc::new(source),
        }
    }

    #[must_use]
    pub fn deferred_rejected(source: impl std::error::Error + 'static) -> Self {
        Self::DeferredRejected {
            source: Rc::new(source),
        }
    }

    /// Re-wrap an already-shared rejection (used when a second reference to
    /// the same `Deferred` observes a cached rejection).
    #[must_use]
    pub fn deferred_rejected_shared(source: Rc<dyn std::error::Error>) -> Self {
        Self::DeferredRejected { source }
    }

    #[must_use]
    pub fn replacer_failure(message: impl Into<String>) -> Self {
        Self::ReplacerFailure {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(operation: impl Into<String>, path: Option<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path,
            source: Rc::new(source),
        }
    }

    #[must_use]
    pub fn file_read(path: PathBuf, source: std::io::Error) -> Self {
        Self::io("failed to read file", Some(path), source)
    }

    #[must_use]
    pub fn file_write(path: PathBuf, source: std::io::Error) -> Self {
        Self::io("failed to write to file", Some(path), source)
    }

    #[must_use]
    pub fn stdin_read(source: std::io::Error) -> Self {
        Self::io("failed to read stdin", None, source)
    }

    #[must_use]
    pub fn stdout_write(source: std::io::Error) -> Self {
        Self::io("failed to write to stdout", None, source)
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(err: std::io::Error) -> Self {
        Self::io("I/O error", None, err)
    }
}
