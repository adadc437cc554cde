// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # recadero-platform
//!
//! Adapter bindings for the recadero distribution service.
//!
//! The core crate defines the [`DistroAdapter`] contract; this crate
//! provides the in-tree binding, [`ShellAdapter`], which realizes
//! distributions as directory roots on the host and launches command lines
//! through the default shell. Bindings to a real virtualization syscall
//! surface implement the same trait.
//!
//! [`DistroAdapter`]: recadero_core::DistroAdapter

#![warn(missing_docs)]

mod shell;

pub use shell::ShellAdapter;
