//! Server lifecycle management.
//!
//! One [`ServerSession`] per service process: the single authority for
//! starting the message loop, keeping the process alive while client
//! objects exist, and shutting it down once the last one is released.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::broker::{FactoryToken, LoopThreadId, ObjectBroker, ServiceFactory};
use crate::config::ServiceConfig;
use crate::error::{SessionError, SessionResult};
use crate::types::SessionState;

static GLOBAL: OnceLock<ServerSession> = OnceLock::new();

/// The server lifecycle manager.
///
/// [`run`](Self::run) drives the cooperative message loop;
/// [`lock`](Self::lock) and [`unlock`](Self::unlock) maintain the count of
/// active client objects from any thread; when the count drops to zero the
/// quit signal is posted to the loop thread and `run` winds down.
///
/// Cloning is cheap and every clone refers to the same session.
#[derive(Clone)]
pub struct ServerSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    broker: Arc<dyn ObjectBroker>,
    config: ServiceConfig,
    state: Mutex<SessionState>,
    lock_count: AtomicI64,
    loop_thread: RwLock<Option<LoopThreadId>>,
    housekeeper: Mutex<Option<Housekeeper>>,
    started_at: Instant,
}

impl ServerSession {
    /// Creates a session over the given broker.
    #[must_use]
    pub fn new(broker: Arc<dyn ObjectBroker>, config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                broker,
                config,
                state: Mutex::new(SessionState::NotRunning),
                lock_count: AtomicI64::new(0),
                loop_thread: RwLock::new(None),
                housekeeper: Mutex::new(None),
                started_at: Instant::now(),
            }),
        }
    }

    /// Installs a session as the process-wide instance.
    ///
    /// # Errors
    /// Returns an error if a global session is already installed.
    pub fn install_global(session: Self) -> SessionResult<()> {
        GLOBAL
            .set(session)
            .map_err(|_| SessionError::GlobalAlreadyInstalled)
    }

    /// Returns the process-wide session, if one has been installed.
    #[must_use]
    pub fn global() -> Option<Self> {
        GLOBAL.get().cloned()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Runs the service: registers the activation factory, drives the
    /// message loop until the quit signal, then tears down. Blocking.
    ///
    /// Idempotent and safe to call from multiple threads: if the session
    /// is already running, the call returns immediately and only the first
    /// caller actually drives the loop.
    ///
    /// # Errors
    /// Returns [`SessionError::FactoryRegistration`] if the broker refuses
    /// the factory. Fatal: the state returns to `NotRunning` and nothing
    /// is retried.
    pub fn run(&self, factory: Arc<dyn ServiceFactory>) -> SessionResult<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::NotRunning {
                tracing::debug!(state = ?*state, "run called while session is active");
                return Ok(());
            }
            *state = SessionState::Running;
        }

        let result = self.run_inner(factory);
        *self.inner.state.lock() = SessionState::NotRunning;
        result
    }

    fn run_inner(&self, factory: Arc<dyn ServiceFactory>) -> SessionResult<()> {
        let token = self.pre_run(factory)?;

        tracing::info!("entering message loop");
        while self.inner.broker.run_loop_step() {}
        tracing::info!("quit signal observed, message loop exited");

        *self.inner.state.lock() = SessionState::ShuttingDown;
        self.post_run(token);
        Ok(())
    }

    /// Registers the activation factory, records the loop thread, and
    /// starts the housekeeping tick.
    fn pre_run(&self, factory: Arc<dyn ServiceFactory>) -> SessionResult<FactoryToken> {
        let service = factory.service_name().to_string();
        let token = self
            .inner
            .broker
            .register_factory(factory)
            .map_err(|source| SessionError::FactoryRegistration { source })?;
        tracing::info!(token = %token, service, "activation factory registered");

        // The quit signal posted by the final unlock targets this thread.
        *self.inner.loop_thread.write() = Some(LoopThreadId::current());

        match Housekeeper::start(&self.inner) {
            Ok(housekeeper) => *self.inner.housekeeper.lock() = Some(housekeeper),
            // Best-effort housekeeping; the service runs without it.
            Err(e) => tracing::warn!(error = %e, "housekeeping thread did not start"),
        }

        Ok(token)
    }

    /// Revokes the factory registration and disposes housekeeping
    /// resources, then waits the grace period for stray worker threads.
    fn post_run(&self, token: FactoryToken) {
        self.inner.broker.revoke_factory(token);

        if let Some(housekeeper) = self.inner.housekeeper.lock().take() {
            housekeeper.stop();
        }
        *self.inner.loop_thread.write() = None;

        std::thread::sleep(self.inner.config.shutdown_grace);
    }

    /// Increments the active-object count. Callable from any thread, never
    /// blocks. Returns the new count.
    pub fn lock(&self) -> i64 {
        let count = self.inner.lock_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(count, "session locked");
        count
    }

    /// Decrements the active-object count; at zero, posts the quit signal
    /// to the loop thread. Callable from any thread, never blocks: the
    /// post is fire-and-forget and the loop observes it on its own
    /// schedule. Returns the new count.
    pub fn unlock(&self) -> i64 {
        let count = self.inner.lock_count.fetch_sub(1, Ordering::SeqCst) - 1;

        if count == 0 {
            if let Some(target) = *self.inner.loop_thread.read() {
                tracing::debug!("lock count reached zero, posting quit signal");
                self.inner.broker.post_quit_signal(target);
            }
        } else if count < 0 {
            tracing::warn!(count, "unlock without a matching lock");
        } else {
            tracing::trace!(count, "session unlocked");
        }

        count
    }

    /// Returns the current active-object count.
    #[must_use]
    pub fn lock_count(&self) -> i64 {
        self.inner.lock_count.load(Ordering::SeqCst)
    }

    /// Acquires a scoped activation token: the count is incremented now
    /// and decremented when the returned guard drops.
    #[must_use]
    pub fn acquire(&self) -> SessionLock {
        self.lock();
        SessionLock {
            session: self.clone(),
        }
    }
}

impl SessionInner {
    /// One housekeeping tick: a heartbeat while the loop runs.
    fn housekeep(&self) {
        tracing::trace!(
            uptime_secs = self.started_at.elapsed().as_secs(),
            active_objects = self.lock_count.load(Ordering::SeqCst),
            "housekeeping tick"
        );
    }
}

/// Scoped activation token. Dropping it releases the session lock it
/// holds, so the count changes exactly when the client's logical session
/// ends.
pub struct SessionLock {
    session: ServerSession,
}

impl SessionLock {
    /// Returns the session this token locks.
    #[must_use]
    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    /// Releases the token explicitly. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.session.unlock();
    }
}

/// Periodic background maintenance while the message loop runs.
struct Housekeeper {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl Housekeeper {
    fn start(inner: &Arc<SessionInner>) -> std::io::Result<Self> {
        let (stop, ticks) = mpsc::channel::<()>();
        let interval = inner.config.housekeeping_interval;
        let weak: Weak<SessionInner> = Arc::downgrade(inner);

        let thread = std::thread::Builder::new()
            .name("recadero-housekeeper".to_string())
            .spawn(move || {
                loop {
                    match ticks.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.housekeep();
                        }
                        // Stop requested, or the session is gone.
                        _ => break,
                    }
                }
            })?;

        Ok(Self { stop, thread })
    }

    fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.thread.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The session's lifecycle behavior is exercised end to end in
    // `crate::tests::lifecycle`; here only the pieces with no broker
    // dependency are covered.

    struct NullBroker;

    impl ObjectBroker for NullBroker {
        fn register_factory(
            &self,
            _factory: Arc<dyn ServiceFactory>,
        ) -> crate::broker::BrokerResult<FactoryToken> {
            Ok(FactoryToken::from_raw(1))
        }

        fn revoke_factory(&self, _token: FactoryToken) {}

        fn post_quit_signal(&self, _target: LoopThreadId) {}

        fn run_loop_step(&self) -> bool {
            false
        }
    }

    fn session() -> ServerSession {
        ServerSession::new(Arc::new(NullBroker), ServiceConfig::default())
    }

    #[test]
    fn test_lock_unlock_counts() {
        let session = session();
        assert_eq!(session.lock_count(), 0);
        assert_eq!(session.lock(), 1);
        assert_eq!(session.lock(), 2);
        assert_eq!(session.unlock(), 1);
        assert_eq!(session.unlock(), 0);
        assert_eq!(session.lock_count(), 0);
    }

    #[test]
    fn test_unlock_below_zero_is_reported() {
        let session = session();
        assert_eq!(session.unlock(), -1);
        assert_eq!(session.lock_count(), -1);
    }

    #[test]
    fn test_session_lock_guard_releases_on_drop() {
        let session = session();
        {
            let _guard = session.acquire();
            assert_eq!(session.lock_count(), 1);
        }
        assert_eq!(session.lock_count(), 0);
    }

    #[test]
    fn test_session_lock_explicit_release() {
        let session = session();
        let guard = session.acquire();
        assert_eq!(session.lock_count(), 1);
        guard.release();
        assert_eq!(session.lock_count(), 0);
    }

    #[test]
    fn test_clones_share_one_count() {
        let session = session();
        let other = session.clone();
        session.lock();
        assert_eq!(other.lock_count(), 1);
        other.unlock();
        assert_eq!(session.lock_count(), 0);
    }

    #[test]
    fn test_initial_state_not_running() {
        let session = session();
        assert_eq!(session.state(), SessionState::NotRunning);
    }

    #[test]
    fn test_concurrent_locks_balance() {
        let session = session();
        let mut workers = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            workers.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    session.lock();
                    session.unlock();
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(session.lock_count(), 0);
    }
}
