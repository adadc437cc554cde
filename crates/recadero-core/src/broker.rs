//! Object broker abstraction and the in-process reference implementation.
//!
//! The broker is the platform's activation machinery as the lifecycle
//! manager sees it: it accepts one activation factory, runs a cooperative
//! message loop, and delivers the quit signal that ends it. Out-of-process
//! hosts bind this trait to their platform's activation protocol; the
//! in-process implementation here runs the same contract over a channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;

use parking_lot::{Mutex, RwLock};

use crate::service::DistroService;

// =============================================================================
// Contract types
// =============================================================================

/// Error type for broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The platform refused the factory registration.
    #[error("factory registration failed with result code {code:#010x}")]
    Registration {
        /// The native result code.
        code: i32,
    },

    /// A factory is already registered with this broker.
    #[error("a factory is already registered: {0}")]
    AlreadyRegistered(String),

    /// No activation factory is registered.
    #[error("no activation factory is registered")]
    NoFactory,
}

/// Result type for broker operations.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Registration cookie returned by [`ObjectBroker::register_factory`],
/// consumed by [`ObjectBroker::revoke_factory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryToken(u32);

impl FactoryToken {
    /// Creates a token from a raw cookie value.
    #[must_use]
    pub const fn from_raw(cookie: u32) -> Self {
        Self(cookie)
    }

    /// Returns the raw cookie value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FactoryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the thread running the message loop: the target of the quit
/// signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopThreadId(std::thread::ThreadId);

impl LoopThreadId {
    /// Returns the id of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self(std::thread::current().id())
    }
}

/// Creates client service objects on activation.
///
/// Activation is what drives the session lock count: every object the
/// factory produces holds a session lock for its lifetime.
pub trait ServiceFactory: Send + Sync {
    /// Returns the public name clients activate the service by.
    fn service_name(&self) -> &str;

    /// Creates one client service object.
    fn activate(&self) -> DistroService;
}

/// The activation machinery as consumed by the lifecycle manager.
pub trait ObjectBroker: Send + Sync {
    /// Registers the service's activation factory.
    ///
    /// # Errors
    /// Returns an error if the platform refuses the registration. The
    /// caller treats this as fatal and does not retry.
    fn register_factory(&self, factory: Arc<dyn ServiceFactory>) -> BrokerResult<FactoryToken>;

    /// Revokes a factory registration. Unknown tokens are ignored.
    fn revoke_factory(&self, token: FactoryToken);

    /// Posts the quit signal to the message loop running on `target`.
    ///
    /// Cross-thread, non-blocking, fire-and-forget: the loop observes the
    /// signal on its own schedule and there is no acknowledgement.
    fn post_quit_signal(&self, target: LoopThreadId);

    /// Retrieves and dispatches one queued message, blocking until one is
    /// available. Returns false once the quit signal has been observed.
    fn run_loop_step(&self) -> bool;
}

// =============================================================================
// InProcessBroker
// =============================================================================

enum LoopMessage {
    Task(Box<dyn FnOnce() + Send>),
    Quit(LoopThreadId),
}

struct RegisteredFactory {
    token: FactoryToken,
    factory: Arc<dyn ServiceFactory>,
}

/// Channel-backed broker for hosts that run the message loop in-process.
///
/// One factory slot, one message queue. Each [`run_loop_step`] call
/// executes exactly one queued task to completion before the next is
/// retrieved.
///
/// [`run_loop_step`]: ObjectBroker::run_loop_step
pub struct InProcessBroker {
    sender: mpsc::Sender<LoopMessage>,
    receiver: Mutex<mpsc::Receiver<LoopMessage>>,
    factory: RwLock<Option<RegisteredFactory>>,
    next_cookie: AtomicU32,
}

impl InProcessBroker {
    /// Creates a broker with an empty queue and no registered factory.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            factory: RwLock::new(None),
            next_cookie: AtomicU32::new(1),
        }
    }

    /// Enqueues a task for the message loop to dispatch. Returns false if
    /// the loop side of the queue is gone.
    pub fn post_task(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(LoopMessage::Task(Box::new(task))).is_ok()
    }

    /// Activates one client service object through the registered factory.
    ///
    /// # Errors
    /// Returns [`BrokerError::NoFactory`] if no factory is registered
    /// (the service is not running, or is shutting down).
    pub fn activate(&self) -> BrokerResult<DistroService> {
        self.factory
            .read()
            .as_ref()
            .map(|registered| registered.factory.activate())
            .ok_or(BrokerError::NoFactory)
    }

    /// Returns the registered factory's service name, if one is
    /// registered.
    #[must_use]
    pub fn registered_service(&self) -> Option<String> {
        self.factory
            .read()
            .as_ref()
            .map(|registered| registered.factory.service_name().to_string())
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBroker for InProcessBroker {
    fn register_factory(&self, factory: Arc<dyn ServiceFactory>) -> BrokerResult<FactoryToken> {
        let mut slot = self.factory.write();
        if let Some(existing) = slot.as_ref() {
            return Err(BrokerError::AlreadyRegistered(
                existing.factory.service_name().to_string(),
            ));
        }

        let token = FactoryToken(self.next_cookie.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(token = %token, service = factory.service_name(), "factory registered");
        *slot = Some(RegisteredFactory { token, factory });
        Ok(token)
    }

    fn revoke_factory(&self, token: FactoryToken) {
        let mut slot = self.factory.write();
        match slot.as_ref() {
            Some(registered) if registered.token == token => {
                tracing::debug!(token = %token, "factory revoked");
                *slot = None;
            }
            _ => tracing::warn!(token = %token, "revoke for unknown factory token ignored"),
        }
    }

    fn post_quit_signal(&self, target: LoopThreadId) {
        // Fire-and-forget: a loop that already exited leaves a
        // disconnected queue, and the signal is simply dropped.
        let _ = self.sender.send(LoopMessage::Quit(target));
    }

    fn run_loop_step(&self) -> bool {
        let message = {
            let receiver = self.receiver.lock();
            receiver.recv()
        };

        match message {
            Err(_) => false,
            Ok(LoopMessage::Task(task)) => {
                task();
                true
            }
            Ok(LoopMessage::Quit(target)) => {
                if target == LoopThreadId::current() {
                    false
                } else {
                    // A quit aimed at another thread's loop would never
                    // have reached this queue; drop it.
                    tracing::warn!("quit signal for another loop thread ignored");
                    true
                }
            }
        }
    }
}
