// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # recadero-core
//!
//! Core primitives for the recadero distribution automation service:
//!
//! - [`CommandLauncher`] runs one command inside one distribution and
//!   relays its standard streams through OS pipes, synchronously.
//! - [`ServerSession`] is the reference-counted lifecycle manager that
//!   keeps the out-of-process service alive while client objects exist.
//! - [`DistroAdapter`] abstracts the native launch/query/configure surface
//!   of the underlying virtualization subsystem.
//! - [`ObjectBroker`] abstracts the platform's activation machinery;
//!   [`InProcessBroker`] runs the same contract over a channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recadero_core::{
//!     CommandLauncher, DistroServiceFactory, InProcessBroker, ServerSession, ServiceConfig,
//! };
//!
//! let broker = Arc::new(InProcessBroker::new());
//! let session = ServerSession::new(broker.clone(), ServiceConfig::default());
//! let factory = Arc::new(DistroServiceFactory::new(session.clone(), adapter, config));
//!
//! // Blocks until the last client object is released.
//! session.run(factory)?;
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod broker;
pub mod config;
pub mod encoding;
pub mod error;
pub mod launcher;
pub mod pipe;
pub mod service;
pub mod session;
#[cfg(test)]
mod tests;
pub mod types;

pub use adapter::{
    AdapterError, AdapterResult, ChildHandle, DistroAdapter, DistroConfiguration, DistroFlags,
};
pub use broker::{
    BrokerError, BrokerResult, FactoryToken, InProcessBroker, LoopThreadId, ObjectBroker,
    ServiceFactory,
};
pub use config::{DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE, ServiceConfig};
pub use encoding::TextEncoding;
pub use error::{CommandError, CommandResult, SessionError, SessionResult};
pub use launcher::CommandLauncher;
pub use service::{DistroService, DistroServiceFactory};
pub use session::{ServerSession, SessionLock};
pub use types::{CommandExit, LaunchRequest, RequestId, SessionState, StreamKind};
