//! Platform adapter abstraction for the virtualization subsystem.
//!
//! Every binding to the native launch/query/configure surface implements
//! the same contract, so the launcher and the client service object never
//! see how the subsystem is reached.

use std::os::fd::OwnedFd;
use std::path::Path;

use serde::{Deserialize, Serialize};

// =============================================================================
// AdapterError
// =============================================================================

/// Error type for platform adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A native call reported a failure result code.
    #[error("native call failed with result code {code:#010x}")]
    Native {
        /// The result code reported by the native surface.
        code: i32,
    },

    /// The distribution is unknown to the platform.
    #[error("distribution not found: {0}")]
    NotFound(String),

    /// The distribution id is already in use.
    #[error("distribution already registered: {0}")]
    AlreadyRegistered(String),

    /// I/O error talking to the platform.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Creates a native failure from a result code.
    #[must_use]
    pub const fn native(code: i32) -> Self {
        Self::Native { code }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(distribution: impl Into<String>) -> Self {
        Self::NotFound(distribution.into())
    }

    /// Returns the native result code for this failure.
    ///
    /// Failures that did not originate in a native call are mapped onto the
    /// OS error number where one exists, and `-1` otherwise.
    #[must_use]
    pub fn native_code(&self) -> i32 {
        match self {
            Self::Native { code } => *code,
            Self::Io(e) => e.raw_os_error().unwrap_or(-1),
            Self::NotFound(_) | Self::AlreadyRegistered(_) => -1,
        }
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

// =============================================================================
// Distribution configuration
// =============================================================================

/// Per-distribution behavior flags.
///
/// A plain bit word rather than an enum set: the native surface defines it
/// as one, and unknown bits must round-trip untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroFlags(u32);

impl DistroFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Allow launching host binaries from inside the distribution.
    pub const ENABLE_INTEROP: Self = Self(0x1);
    /// Append the host search path to the guest environment.
    pub const APPEND_HOST_PATH: Self = Self(0x2);
    /// Mount host drives inside the distribution.
    pub const ENABLE_DRIVE_MOUNTING: Self = Self(0x4);
    /// The default flag set for a newly registered distribution.
    pub const DEFAULT: Self = Self(0x7);

    /// Creates a flag word from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DistroFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for DistroFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration of a registered distribution, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroConfiguration {
    /// Filesystem format version of the distribution.
    pub version: u32,
    /// Uid the default user maps to inside the distribution.
    pub default_uid: u32,
    /// Behavior flags.
    pub flags: DistroFlags,
    /// Default environment variables, as `NAME=value` strings.
    pub default_environment: Vec<String>,
}

impl Default for DistroConfiguration {
    fn default() -> Self {
        Self {
            version: 2,
            default_uid: 0,
            flags: DistroFlags::DEFAULT,
            default_environment: vec![
                "HOSTTYPE=x86_64".to_string(),
                "LANG=en_US.UTF-8".to_string(),
                "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
                "TERM=xterm-256color".to_string(),
            ],
        }
    }
}

// =============================================================================
// DistroAdapter trait
// =============================================================================

/// Handle to a process spawned inside a distribution.
///
/// Owned by the launcher from launch until exit-code retrieval; dropping it
/// releases the underlying process handle.
pub trait ChildHandle: Send {
    /// Retrieves the child's exit code, reaping the process.
    ///
    /// Blocks until the child has exited. By the time the launcher calls
    /// this, both output pipes have reported end-of-stream.
    ///
    /// # Errors
    /// Returns an error if the exit code cannot be retrieved.
    fn exit_code(&mut self) -> AdapterResult<i32>;
}

/// Binding to the native launch/query/configure surface of the
/// virtualization subsystem.
///
/// The launch call consumes the three child-facing pipe ends: ownership of
/// those descriptors transfers into the spawn, and the implementation must
/// have released its copies by the time `launch` returns. That release is
/// what lets the parent observe end-of-stream on stdout and stderr once the
/// child exits.
pub trait DistroAdapter: Send + Sync {
    /// Returns true if the distribution is registered with the platform.
    fn is_registered(&self, distribution: &str) -> bool;

    /// Spawns `command_line` inside `distribution` with the given pipe ends
    /// installed as the child's standard streams.
    ///
    /// When `use_current_working_directory` is false the child starts in
    /// the distribution's default directory.
    ///
    /// # Errors
    /// Returns an error carrying the native result code if the launch
    /// primitive fails.
    fn launch(
        &self,
        distribution: &str,
        command_line: &str,
        use_current_working_directory: bool,
        stdin: OwnedFd,
        stdout: OwnedFd,
        stderr: OwnedFd,
    ) -> AdapterResult<Box<dyn ChildHandle>>;

    /// Queries the distribution's configuration.
    ///
    /// # Errors
    /// Returns an error if the distribution is unknown or the query fails.
    fn configuration(&self, distribution: &str) -> AdapterResult<DistroConfiguration>;

    /// Updates the distribution's default uid and behavior flags.
    ///
    /// # Errors
    /// Returns an error if the distribution is unknown or the update fails.
    fn configure(
        &self,
        distribution: &str,
        default_uid: u32,
        flags: DistroFlags,
    ) -> AdapterResult<()>;

    /// Registers a new distribution from an archive.
    ///
    /// # Errors
    /// Returns an error if the id is taken or the archive is unusable.
    fn register(&self, distribution: &str, archive_path: &Path) -> AdapterResult<()>;

    /// Unregisters a distribution.
    ///
    /// # Errors
    /// Returns an error if the distribution is unknown.
    fn unregister(&self, distribution: &str) -> AdapterResult<()>;
}
