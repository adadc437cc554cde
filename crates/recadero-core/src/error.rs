//! Error types for recadero-core.
//!
//! All failure modes are explicit; nothing in this crate panics or retries.

use crate::adapter::AdapterError;
use crate::broker::BrokerError;
use crate::types::StreamKind;

/// Result type alias for command launch operations.
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// Result type alias for server lifecycle operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Error type for a single command launch.
///
/// Setup, launch, and argument errors abort the operation immediately with
/// no retry. Output chunks already delivered to the caller's callbacks
/// before a later I/O error are not revoked.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Malformed request, rejected before any resource is acquired.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The target distribution is unknown to the platform. Rejected before
    /// any pipe is created.
    #[error("distribution is not registered: {0}")]
    NotRegistered(String),

    /// Pipe or handle creation failed. Partially created descriptors are
    /// released before this propagates.
    #[error("pipe setup failed: {source}")]
    Setup {
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The native launch call reported a failure result code.
    #[error("launch failed with native result code {code:#010x}")]
    Launch {
        /// The native result code reported by the launch primitive.
        code: i32,
        /// The adapter-level failure.
        #[source]
        source: AdapterError,
    },

    /// A read or write on an established pipe failed with a genuine error
    /// code (distinct from the benign zero-byte end-of-stream signal).
    #[error("I/O error on {stream} pipe: {source}")]
    Io {
        /// Which of the three standard streams failed.
        stream: StreamKind,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The child terminated but its exit code could not be retrieved.
    #[error("exit code query failed: {source}")]
    ExitCodeQuery {
        /// The adapter-level failure.
        #[source]
        source: AdapterError,
    },
}

impl CommandError {
    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a not-registered error for the given distribution.
    #[must_use]
    pub fn not_registered(distribution: impl Into<String>) -> Self {
        Self::NotRegistered(distribution.into())
    }

    /// Creates a setup error from an OS error.
    #[must_use]
    pub fn setup(source: std::io::Error) -> Self {
        Self::Setup { source }
    }

    /// Wraps an adapter launch failure, carrying its native result code.
    #[must_use]
    pub fn launch(source: AdapterError) -> Self {
        Self::Launch {
            code: source.native_code(),
            source,
        }
    }

    /// Creates a pipe I/O error for the given stream.
    #[must_use]
    pub fn io(stream: StreamKind, source: std::io::Error) -> Self {
        Self::Io { stream, source }
    }

    /// Returns true if the request was rejected before any resource was
    /// acquired.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::NotRegistered(_))
    }

    /// Returns the native result code carried by a launch failure, if any.
    #[must_use]
    pub const fn native_code(&self) -> Option<i32> {
        match self {
            Self::Launch { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Error type for the server lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Registering the activation factory with the object broker failed.
    /// Fatal: the service cannot start and the failure is not retried.
    #[error("activation factory registration failed: {source}")]
    FactoryRegistration {
        /// The broker-level failure.
        #[source]
        source: BrokerError,
    },

    /// A process-global session was already installed.
    #[error("a global server session is already installed")]
    GlobalAlreadyInstalled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if this error means the service process cannot start.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::FactoryRegistration { .. })
    }
}
