//! Core types for the launch and lifecycle subsystems.

use serde::{Deserialize, Serialize};

/// Correlation id for a single launch request.
///
/// Stamped on every log line a launch emits, so the interleaved output of
/// concurrent service objects can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    /// Creates a new random request id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One command to run inside one distribution. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    distribution: String,
    command_line: String,
    use_current_working_directory: bool,
}

impl LaunchRequest {
    /// Creates a request to run `command_line` inside `distribution`.
    ///
    /// The child starts in the distribution's default directory; see
    /// [`use_current_working_directory`](Self::use_current_working_directory)
    /// to inherit the service's working directory instead.
    #[must_use]
    pub fn new(distribution: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            distribution: distribution.into(),
            command_line: command_line.into(),
            use_current_working_directory: false,
        }
    }

    /// Sets whether the child inherits the service's working directory.
    #[must_use]
    pub fn use_current_working_directory(mut self, use_cwd: bool) -> Self {
        self.use_current_working_directory = use_cwd;
        self
    }

    /// Returns the target distribution id.
    #[must_use]
    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    /// Returns the command line.
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Returns true if the child inherits the service's working directory.
    #[must_use]
    pub const fn uses_current_working_directory(&self) -> bool {
        self.use_current_working_directory
    }
}

/// Outcome of a completed command launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExit {
    /// The native process exit code.
    pub exit_code: i32,
    /// Total bytes actually written to the child's stdin across all writes.
    pub stdin_bytes_written: u64,
}

impl CommandExit {
    /// Returns true if the child exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Which of the three standard streams an I/O error occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    /// The child's standard input.
    Stdin,
    /// The child's standard output.
    Stdout,
    /// The child's standard error.
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        };
        f.write_str(name)
    }
}

/// Server session lifecycle state.
///
/// ```text
/// NotRunning → Running → ShuttingDown → NotRunning
/// ```
///
/// The only transition taken under the session mutex is
/// `NotRunning → Running`; the rest happen on the loop thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No message loop is running.
    NotRunning,
    /// The message loop is processing events.
    Running,
    /// The loop observed the quit signal; teardown is in progress.
    ShuttingDown,
}

impl SessionState {
    /// Returns true if a `run` call currently owns the session.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::ShuttingDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_id_display_is_uuid() {
        let display = RequestId::new().to_string();
        assert_eq!(display.len(), 36);
        assert!(display.contains('-'));
    }

    #[test]
    fn test_launch_request_defaults() {
        let request = LaunchRequest::new("ubuntu", "ls -la");
        assert_eq!(request.distribution(), "ubuntu");
        assert_eq!(request.command_line(), "ls -la");
        assert!(!request.uses_current_working_directory());
    }

    #[test]
    fn test_launch_request_cwd_builder() {
        let request = LaunchRequest::new("ubuntu", "pwd").use_current_working_directory(true);
        assert!(request.uses_current_working_directory());
    }

    #[test]
    fn test_command_exit_success() {
        let exit = CommandExit {
            exit_code: 0,
            stdin_bytes_written: 42,
        };
        assert!(exit.success());

        let failed = CommandExit {
            exit_code: 7,
            stdin_bytes_written: 0,
        };
        assert!(!failed.success());
    }

    #[test]
    fn test_stream_kind_display() {
        assert_eq!(StreamKind::Stdin.to_string(), "stdin");
        assert_eq!(StreamKind::Stdout.to_string(), "stdout");
        assert_eq!(StreamKind::Stderr.to_string(), "stderr");
    }

    #[test]
    fn test_session_state_active() {
        assert!(!SessionState::NotRunning.is_active());
        assert!(SessionState::Running.is_active());
        assert!(SessionState::ShuttingDown.is_active());
    }

    #[test]
    fn test_launch_request_serialize_roundtrip() {
        let request = LaunchRequest::new("test-distro", "printf hello");
        let json = serde_json::to_string(&request).unwrap();
        let deserialized: LaunchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, deserialized);
    }
}
