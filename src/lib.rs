//! Recadero: a reference-counted out-of-process automation service for
//! guest distributions.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recadero::prelude::*;
//!
//! let adapter = Arc::new(ShellAdapter::new());
//! adapter.add_distribution("demo", "/");
//!
//! let broker = Arc::new(InProcessBroker::new());
//! let config = ServiceConfig::default();
//! let session = ServerSession::new(broker.clone(), config.clone());
//! let factory = Arc::new(DistroServiceFactory::new(
//!     session.clone(),
//!     adapter,
//!     config,
//! ));
//!
//! // Keep the service alive while this host drives it.
//! let boot = session.acquire();
//! # drop(boot);
//! ```

pub use recadero_core as core;
pub use recadero_platform as platform;

/// Prelude module for common imports.
pub mod prelude {
    pub use recadero_core::{
        CommandError, CommandExit, CommandLauncher, DistroAdapter, DistroConfiguration,
        DistroFlags, DistroService, DistroServiceFactory, InProcessBroker, LaunchRequest,
        ObjectBroker, ServerSession, ServiceConfig, SessionLock, SessionState, TextEncoding,
    };
    pub use recadero_platform::ShellAdapter;
}
