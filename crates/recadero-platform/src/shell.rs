//! Shell-backed adapter binding.
//!
//! Realizes the adapter contract without a virtualization subsystem: a
//! distribution is a directory root on the host, and the launch primitive
//! is the default shell. This is the binding the scenario tests and the
//! demo host run against; the descriptor-passing contract it exercises is
//! exactly the one a native binding must honor.

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use parking_lot::RwLock;

use recadero_core::{
    AdapterError, AdapterResult, ChildHandle, DistroAdapter, DistroConfiguration, DistroFlags,
};

const DEFAULT_SHELL: &str = "/bin/sh";

struct ShellDistribution {
    root: PathBuf,
    configuration: DistroConfiguration,
}

/// Adapter that launches commands through the default shell, with each
/// registered distribution backed by a directory root.
///
/// Registration treats the archive path as an already-materialized root
/// directory; unpacking archives belongs to an installer front-end, not
/// to the adapter.
pub struct ShellAdapter {
    shell: PathBuf,
    distributions: RwLock<HashMap<String, ShellDistribution>>,
}

impl ShellAdapter {
    /// Creates an adapter launching through `/bin/sh`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            distributions: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the shell binary used for launches.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Seeds a registered distribution directly, bypassing the archive
    /// path. Intended for hosts and tests.
    pub fn add_distribution(&self, distribution: &str, root: impl Into<PathBuf>) {
        self.distributions.write().insert(
            distribution.to_string(),
            ShellDistribution {
                root: root.into(),
                configuration: DistroConfiguration::default(),
            },
        );
    }

    /// Returns the registered distribution ids.
    #[must_use]
    pub fn distribution_names(&self) -> Vec<String> {
        self.distributions.read().keys().cloned().collect()
    }
}

impl Default for ShellAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DistroAdapter for ShellAdapter {
    fn is_registered(&self, distribution: &str) -> bool {
        self.distributions.read().contains_key(distribution)
    }

    fn launch(
        &self,
        distribution: &str,
        command_line: &str,
        use_current_working_directory: bool,
        stdin: OwnedFd,
        stdout: OwnedFd,
        stderr: OwnedFd,
    ) -> AdapterResult<Box<dyn ChildHandle>> {
        let distributions = self.distributions.read();
        let entry = distributions
            .get(distribution)
            .ok_or_else(|| AdapterError::not_found(distribution))?;

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .env("RECADERO_DISTRIBUTION", distribution);

        for variable in &entry.configuration.default_environment {
            if let Some((name, value)) = variable.split_once('=') {
                command.env(name, value);
            }
        }

        if !use_current_working_directory {
            command.current_dir(&entry.root);
        }

        // Spawning duplicates the three ends onto the child's stdio;
        // dropping `command` releases the parent's copies.
        let child = command.spawn()?;
        tracing::debug!(
            distribution,
            pid = child.id(),
            use_current_working_directory,
            "launched shell child"
        );

        Ok(Box::new(ShellChild { child }))
    }

    fn configuration(&self, distribution: &str) -> AdapterResult<DistroConfiguration> {
        self.distributions
            .read()
            .get(distribution)
            .map(|entry| entry.configuration.clone())
            .ok_or_else(|| AdapterError::not_found(distribution))
    }

    fn configure(
        &self,
        distribution: &str,
        default_uid: u32,
        flags: DistroFlags,
    ) -> AdapterResult<()> {
        let mut distributions = self.distributions.write();
        let entry = distributions
            .get_mut(distribution)
            .ok_or_else(|| AdapterError::not_found(distribution))?;
        entry.configuration.default_uid = default_uid;
        entry.configuration.flags = flags;
        tracing::debug!(distribution, default_uid, flags = flags.bits(), "reconfigured");
        Ok(())
    }

    fn register(&self, distribution: &str, archive_path: &Path) -> AdapterResult<()> {
        if !archive_path.is_dir() {
            return Err(AdapterError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("distribution root not found: {}", archive_path.display()),
            )));
        }

        let mut distributions = self.distributions.write();
        if distributions.contains_key(distribution) {
            return Err(AdapterError::AlreadyRegistered(distribution.to_string()));
        }
        distributions.insert(
            distribution.to_string(),
            ShellDistribution {
                root: archive_path.to_path_buf(),
                configuration: DistroConfiguration::default(),
            },
        );
        tracing::info!(distribution, root = %archive_path.display(), "distribution registered");
        Ok(())
    }

    fn unregister(&self, distribution: &str) -> AdapterResult<()> {
        self.distributions
            .write()
            .remove(distribution)
            .map(|_| tracing::info!(distribution, "distribution unregistered"))
            .ok_or_else(|| AdapterError::not_found(distribution))
    }
}

struct ShellChild {
    child: std::process::Child,
}

impl ChildHandle for ShellChild {
    fn exit_code(&mut self) -> AdapterResult<i32> {
        let status = self.child.wait()?;
        status
            .code()
            .or_else(|| status.signal().map(|signal| 128 + signal))
            .ok_or_else(|| {
                AdapterError::Io(std::io::Error::other(
                    "child terminated without an exit status",
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recadero_core::{CommandLauncher, LaunchRequest};
    use std::sync::Arc;

    fn registered() -> Arc<ShellAdapter> {
        let adapter = Arc::new(ShellAdapter::new());
        adapter.add_distribution("test-distro", "/");
        adapter
    }

    #[test]
    fn test_registration_lifecycle() {
        let adapter = ShellAdapter::new();
        assert!(!adapter.is_registered("alpine"));

        adapter.register("alpine", Path::new("/")).unwrap();
        assert!(adapter.is_registered("alpine"));
        assert_eq!(adapter.distribution_names(), vec!["alpine".to_string()]);

        let duplicate = adapter.register("alpine", Path::new("/"));
        assert!(matches!(duplicate, Err(AdapterError::AlreadyRegistered(_))));

        adapter.unregister("alpine").unwrap();
        assert!(!adapter.is_registered("alpine"));
        assert!(matches!(
            adapter.unregister("alpine"),
            Err(AdapterError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_requires_existing_root() {
        let adapter = ShellAdapter::new();
        let result = adapter.register("ghost", Path::new("/nonexistent/recadero-root"));
        assert!(matches!(result, Err(AdapterError::Io(_))));
    }

    #[test]
    fn test_configure_roundtrip() {
        let adapter = registered();
        adapter
            .configure("test-distro", 1000, DistroFlags::ENABLE_INTEROP)
            .unwrap();

        let config = adapter.configuration("test-distro").unwrap();
        assert_eq!(config.default_uid, 1000);
        assert_eq!(config.flags, DistroFlags::ENABLE_INTEROP);
    }

    #[test]
    fn test_configuration_unknown_distribution() {
        let adapter = ShellAdapter::new();
        assert!(matches!(
            adapter.configuration("missing"),
            Err(AdapterError::NotFound(_))
        ));
    }

    #[test]
    fn test_launch_relays_stdout() {
        let adapter = registered();
        let launcher = CommandLauncher::new(adapter);

        let request = LaunchRequest::new("test-distro", "printf hello");
        let mut output = Vec::new();
        let exit = launcher
            .run_command(&request, None, |chunk| output.extend_from_slice(chunk), |_| {})
            .unwrap();

        assert_eq!(exit.exit_code, 0);
        assert_eq!(output, b"hello");
    }

    #[test]
    fn test_signal_termination_maps_to_128_plus_signal() {
        let adapter = registered();
        let launcher = CommandLauncher::new(adapter);

        let request = LaunchRequest::new("test-distro", "kill -TERM $$");
        let exit = launcher.run_command(&request, None, |_| {}, |_| {}).unwrap();

        assert_eq!(exit.exit_code, 128 + 15);
    }

    #[test]
    fn test_distribution_environment_is_applied() {
        let adapter = registered();
        let launcher = CommandLauncher::new(adapter);

        let request = LaunchRequest::new("test-distro", "printf '%s' \"$RECADERO_DISTRIBUTION\"");
        let mut output = Vec::new();
        launcher
            .run_command(&request, None, |chunk| output.extend_from_slice(chunk), |_| {})
            .unwrap();

        assert_eq!(output, b"test-distro");
    }

    #[test]
    fn test_default_directory_is_distribution_root() {
        let adapter = registered();
        let launcher = CommandLauncher::new(adapter);

        let request = LaunchRequest::new("test-distro", "pwd");
        let mut output = Vec::new();
        launcher
            .run_command(&request, None, |chunk| output.extend_from_slice(chunk), |_| {})
            .unwrap();

        assert_eq!(output, b"/\n");
    }
}
