//! The client service object and its activation factory.
//!
//! Thin by design: a [`DistroService`] holds a session lock for its whole
//! life and forwards calls to the launcher and the platform adapter. The
//! lock count changes exactly when the object is created and dropped.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::adapter::{AdapterResult, DistroAdapter, DistroConfiguration, DistroFlags};
use crate::broker::ServiceFactory;
use crate::config::ServiceConfig;
use crate::error::CommandResult;
use crate::launcher::CommandLauncher;
use crate::session::{ServerSession, SessionLock};
use crate::types::LaunchRequest;

/// The object external callers activate.
///
/// Construction locks the server session; dropping the object unlocks it.
/// When the last live object is dropped the service shuts down.
pub struct DistroService {
    lock: SessionLock,
    adapter: Arc<dyn DistroAdapter>,
    launcher: CommandLauncher,
}

impl DistroService {
    /// Creates a service object, locking the session for its lifetime.
    #[must_use]
    pub fn new(
        session: &ServerSession,
        adapter: Arc<dyn DistroAdapter>,
        config: &ServiceConfig,
    ) -> Self {
        let lock = session.acquire();
        let launcher =
            CommandLauncher::new(Arc::clone(&adapter)).with_buffer_size(config.buffer_size);
        Self {
            lock,
            adapter,
            launcher,
        }
    }

    /// Returns the session this object keeps alive.
    #[must_use]
    pub fn session(&self) -> &ServerSession {
        self.lock.session()
    }

    /// Returns the launcher for callers that want chunk-level streaming.
    #[must_use]
    pub const fn launcher(&self) -> &CommandLauncher {
        &self.launcher
    }

    /// Returns true if the distribution is registered with the platform.
    #[must_use]
    pub fn is_registered(&self, distribution: &str) -> bool {
        self.adapter.is_registered(distribution)
    }

    /// Runs a command and returns its stdout as decoded text. The exit
    /// code does not affect the result; whatever the command printed is
    /// returned.
    ///
    /// # Errors
    /// Same contract as [`CommandLauncher::run_command`].
    pub fn run_command(&self, distribution: &str, command_line: &str) -> CommandResult<String> {
        let request = LaunchRequest::new(distribution, command_line);
        let (exit, output) = self.launcher.capture_stdout(&request, None)?;
        if !exit.success() {
            tracing::debug!(exit_code = exit.exit_code, "command exited non-zero");
        }
        Ok(output)
    }

    /// Runs a command with the given byte stream as its stdin and returns
    /// its stdout as decoded text.
    ///
    /// # Errors
    /// Same contract as [`CommandLauncher::run_command`].
    pub fn run_command_with_input(
        &self,
        distribution: &str,
        command_line: &str,
        input: &mut dyn Read,
    ) -> CommandResult<String> {
        let request = LaunchRequest::new(distribution, command_line);
        let (exit, output) = self.launcher.capture_stdout(&request, Some(input))?;
        if !exit.success() {
            tracing::debug!(exit_code = exit.exit_code, "command exited non-zero");
        }
        Ok(output)
    }

    /// Queries a distribution's configuration.
    ///
    /// # Errors
    /// Forwards the adapter's failure.
    pub fn configuration(&self, distribution: &str) -> AdapterResult<DistroConfiguration> {
        self.adapter.configuration(distribution)
    }

    /// Updates a distribution's default uid and behavior flags.
    ///
    /// # Errors
    /// Forwards the adapter's failure.
    pub fn configure(
        &self,
        distribution: &str,
        default_uid: u32,
        flags: DistroFlags,
    ) -> AdapterResult<()> {
        self.adapter.configure(distribution, default_uid, flags)
    }

    /// Registers a distribution from an archive.
    ///
    /// # Errors
    /// Forwards the adapter's failure.
    pub fn register(&self, distribution: &str, archive_path: &Path) -> AdapterResult<()> {
        self.adapter.register(distribution, archive_path)
    }

    /// Unregisters a distribution.
    ///
    /// # Errors
    /// Forwards the adapter's failure.
    pub fn unregister(&self, distribution: &str) -> AdapterResult<()> {
        self.adapter.unregister(distribution)
    }
}

/// Activation factory for [`DistroService`] objects; this is what the
/// session registers with the object broker.
pub struct DistroServiceFactory {
    session: ServerSession,
    adapter: Arc<dyn DistroAdapter>,
    config: ServiceConfig,
}

impl DistroServiceFactory {
    /// Creates a factory producing service objects bound to `session` and
    /// `adapter`.
    #[must_use]
    pub fn new(
        session: ServerSession,
        adapter: Arc<dyn DistroAdapter>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            session,
            adapter,
            config,
        }
    }
}

impl ServiceFactory for DistroServiceFactory {
    fn service_name(&self) -> &str {
        "recadero.DistroService"
    }

    fn activate(&self) -> DistroService {
        DistroService::new(&self.session, Arc::clone(&self.adapter), &self.config)
    }
}
