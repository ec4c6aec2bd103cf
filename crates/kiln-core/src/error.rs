//! Error types for the kiln client.
//!
//! Two taxonomies are kept apart until the very last step:
//!
//! - [`TransportError`]: the socket, the framing, or the payload bytes failed.
//!   These drive the retry loop in [`crate::rpc`].
//! - Server-reported failures: the daemon decoded the request and answered
//!   with a non-zero [`ErrorCode`].
//!
//! Every public call folds both into a single [`CallError`].

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes carried in the `error` field of a daemon reply.
///
/// `Transport` never travels on the wire; the client uses it to report that
/// it could not reach the daemon at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    Unknown,
    InvalidMethod,
    ContainerAlreadyExists,
    ContainerDoesNotExist,
    InvalidProperty,
    InvalidData,
    InvalidValue,
    InvalidState,
    NotSupported,
    ResourceNotAvailable,
    Permission,
    VolumeAlreadyExists,
    VolumeNotFound,
    /// The daemon socket could not be reached.
    Transport,
    /// A code this client does not know about, kept verbatim.
    Unrecognized(i32),
}

impl ErrorCode {
    /// Wire value used for [`ErrorCode::Transport`].
    pub const TRANSPORT_SENTINEL: i32 = i32::MIN;

    /// Map a wire value to a code.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ErrorCode::Success,
            1 => ErrorCode::Unknown,
            2 => ErrorCode::InvalidMethod,
            3 => ErrorCode::ContainerAlreadyExists,
            4 => ErrorCode::ContainerDoesNotExist,
            5 => ErrorCode::InvalidProperty,
            6 => ErrorCode::InvalidData,
            7 => ErrorCode::InvalidValue,
            8 => ErrorCode::InvalidState,
            9 => ErrorCode::NotSupported,
            10 => ErrorCode::ResourceNotAvailable,
            11 => ErrorCode::Permission,
            12 => ErrorCode::VolumeAlreadyExists,
            13 => ErrorCode::VolumeNotFound,
            Self::TRANSPORT_SENTINEL => ErrorCode::Transport,
            other => ErrorCode::Unrecognized(other),
        }
    }

    /// Wire value of this code.
    pub fn as_raw(&self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::Unknown => 1,
            ErrorCode::InvalidMethod => 2,
            ErrorCode::ContainerAlreadyExists => 3,
            ErrorCode::ContainerDoesNotExist => 4,
            ErrorCode::InvalidProperty => 5,
            ErrorCode::InvalidData => 6,
            ErrorCode::InvalidValue => 7,
            ErrorCode::InvalidState => 8,
            ErrorCode::NotSupported => 9,
            ErrorCode::ResourceNotAvailable => 10,
            ErrorCode::Permission => 11,
            ErrorCode::VolumeAlreadyExists => 12,
            ErrorCode::VolumeNotFound => 13,
            ErrorCode::Transport => Self::TRANSPORT_SENTINEL,
            ErrorCode::Unrecognized(raw) => *raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::Unknown => "Unknown",
            ErrorCode::InvalidMethod => "InvalidMethod",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerDoesNotExist => "ContainerDoesNotExist",
            ErrorCode::InvalidProperty => "InvalidProperty",
            ErrorCode::InvalidData => "InvalidData",
            ErrorCode::InvalidValue => "InvalidValue",
            ErrorCode::InvalidState => "InvalidState",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::ResourceNotAvailable => "ResourceNotAvailable",
            ErrorCode::Permission => "Permission",
            ErrorCode::VolumeAlreadyExists => "VolumeAlreadyExists",
            ErrorCode::VolumeNotFound => "VolumeNotFound",
            ErrorCode::Transport => "Transport",
            ErrorCode::Unrecognized(_) => "Unrecognized",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unrecognized(raw) => write!(f, "Unrecognized({})", raw),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Failure below the application layer: connect, framing, or payload bytes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Cannot connect to {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Socket I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Message size {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl TransportError {
    /// Connect-time permission and existence errors are configuration
    /// mistakes, not congestion; retrying them only burns the budget.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
            ),
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// Whether the failure happened before any byte was exchanged.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect { .. })
    }
}

/// Which layer produced a [`CallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// The daemon answered with a non-zero error code.
    Server,
    /// The daemon could not be reached or the exchange broke down.
    Transport,
    /// The request was rejected before contacting the daemon.
    Local,
}

/// Outcome of a failed call: one code and one message, whatever failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CallError {
    pub code: ErrorCode,
    pub message: String,
    pub origin: ErrorOrigin,
}

impl CallError {
    /// Error reported by the daemon in a decoded reply.
    pub fn server(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            origin: ErrorOrigin::Server,
        }
    }

    /// Request rejected on the client side, no connection attempted.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidValue,
            message: message.into(),
            origin: ErrorOrigin::Local,
        }
    }

    /// Reply decoded fine but carried a payload for another operation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Unknown,
            message: message.into(),
            origin: ErrorOrigin::Transport,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.origin == ErrorOrigin::Transport
    }
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        let code = if err.is_connect() {
            ErrorCode::Transport
        } else {
            ErrorCode::Unknown
        };
        Self {
            code,
            message: err.to_string(),
            origin: ErrorOrigin::Transport,
        }
    }
}

/// Result type alias for client calls.
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors from the filesystem helper used to prepare volume paths.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: io::Error, path: impl Into<PathBuf>) -> Self {
        FsError::Io {
            message: err.to_string(),
            path: path.into(),
            source: err,
        }
    }
}
