// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # recadero-test
//!
//! Testing infrastructure for the recadero service: a wired-up harness
//! over the shell adapter and the in-process broker, a broker wrapper
//! that counts contract traffic, and small helpers for byte payloads and
//! descriptor accounting. The scenario suites under `tests/` run on top
//! of this crate.

#![warn(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use recadero_core::{
    BrokerResult, DistroService, DistroServiceFactory, FactoryToken, InProcessBroker,
    LoopThreadId, ObjectBroker, ServerSession, ServiceConfig, ServiceFactory, SessionError,
    SessionLock, SessionResult,
};
use recadero_platform::ShellAdapter;

/// Initializes test logging once per process. Safe to call from every
/// test; later calls are no-ops.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic byte payload of the given length.
#[must_use]
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Number of open file descriptors in this process.
#[cfg(target_os = "linux")]
#[must_use]
pub fn open_descriptor_count() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Broker wrapper that counts contract traffic while delegating to an
/// [`InProcessBroker`].
pub struct CountingBroker {
    inner: InProcessBroker,
    registrations: AtomicU32,
    revocations: AtomicU32,
    quit_posts: AtomicU32,
}

impl CountingBroker {
    /// Creates a counting broker over a fresh in-process loop.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: InProcessBroker::new(),
            registrations: AtomicU32::new(0),
            revocations: AtomicU32::new(0),
            quit_posts: AtomicU32::new(0),
        }
    }

    /// Number of factory registrations observed.
    #[must_use]
    pub fn registrations(&self) -> u32 {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of factory revocations observed.
    #[must_use]
    pub fn revocations(&self) -> u32 {
        self.revocations.load(Ordering::SeqCst)
    }

    /// Number of quit signals posted.
    #[must_use]
    pub fn quit_posts(&self) -> u32 {
        self.quit_posts.load(Ordering::SeqCst)
    }

    /// Activates one service object through the registered factory.
    ///
    /// # Errors
    /// Forwards [`recadero_core::BrokerError::NoFactory`] when the
    /// service is not accepting activations.
    pub fn activate(&self) -> BrokerResult<DistroService> {
        self.inner.activate()
    }
}

impl Default for CountingBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBroker for CountingBroker {
    fn register_factory(&self, factory: Arc<dyn ServiceFactory>) -> BrokerResult<FactoryToken> {
        let token = self.inner.register_factory(factory)?;
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(token)
    }

    fn revoke_factory(&self, token: FactoryToken) {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        self.inner.revoke_factory(token);
    }

    fn post_quit_signal(&self, target: LoopThreadId) {
        self.quit_posts.fetch_add(1, Ordering::SeqCst);
        self.inner.post_quit_signal(target);
    }

    fn run_loop_step(&self) -> bool {
        self.inner.run_loop_step()
    }
}

/// A fully wired service: shell adapter, counting broker, session, and
/// activation factory, with timings tightened for tests.
pub struct ServiceHarness {
    /// The broker the session runs against.
    pub broker: Arc<CountingBroker>,
    /// The lifecycle manager under test.
    pub session: ServerSession,
    /// The shell adapter, pre-seeded with `test-distro` rooted at `/`.
    pub adapter: Arc<ShellAdapter>,
    factory: Arc<DistroServiceFactory>,
}

impl ServiceHarness {
    /// Creates a harness with `test-distro` registered.
    #[must_use]
    pub fn new() -> Self {
        init_tracing();
        let config = Self::config();

        let adapter = Arc::new(ShellAdapter::new());
        adapter.add_distribution("test-distro", "/");

        let broker = Arc::new(CountingBroker::new());
        let session = ServerSession::new(broker.clone(), config.clone());
        let factory = Arc::new(DistroServiceFactory::new(
            session.clone(),
            adapter.clone(),
            config,
        ));

        Self {
            broker,
            session,
            adapter,
            factory,
        }
    }

    /// Test-speed service configuration.
    #[must_use]
    pub fn config() -> ServiceConfig {
        ServiceConfig {
            housekeeping_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_millis(10),
            ..ServiceConfig::default()
        }
    }

    /// A launcher over the harness adapter.
    #[must_use]
    pub fn launcher(&self) -> recadero_core::CommandLauncher {
        recadero_core::CommandLauncher::new(self.adapter.clone())
    }

    /// Starts the service on a background thread, holding a boot lock so
    /// the loop stays alive until [`RunningService::shutdown`].
    ///
    /// # Errors
    /// Returns an error if the factory registration is not observed
    /// within the startup deadline.
    pub fn start(&self) -> SessionResult<RunningService> {
        let boot = self.session.acquire();
        let thread = {
            let session = self.session.clone();
            let factory = Arc::clone(&self.factory);
            std::thread::spawn(move || session.run(factory))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while self.broker.registrations() == self.broker.revocations() {
            if Instant::now() > deadline {
                return Err(SessionError::config("service did not start within 5s"));
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        Ok(RunningService { boot, thread })
    }
}

impl Default for ServiceHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A service started by [`ServiceHarness::start`].
pub struct RunningService {
    boot: SessionLock,
    thread: JoinHandle<SessionResult<()>>,
}

impl RunningService {
    /// Returns true if the run thread has already returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Releases the boot lock and waits for the service to wind down.
    ///
    /// # Errors
    /// Forwards the run result, or reports a panicked run thread.
    pub fn shutdown(self) -> SessionResult<()> {
        drop(self.boot);
        self.thread
            .join()
            .map_err(|_| SessionError::config("service run thread panicked"))?
    }
}
