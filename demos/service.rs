// Examples are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Recadero Service Example
//!
//! Runs the whole system in one process: shell adapter, in-process
//! broker, lifecycle session, and a client service object driving a
//! command inside a distribution.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example service
//!
//! # With logs
//! RUST_LOG=recadero_core=debug cargo run --example service
//! ```

use std::sync::Arc;
use std::thread;

use recadero::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let adapter = Arc::new(ShellAdapter::new());
    adapter.add_distribution("demo", "/");

    let config = ServiceConfig::default();
    let broker = Arc::new(InProcessBroker::new());
    let session = ServerSession::new(broker.clone(), config.clone());
    let factory = Arc::new(DistroServiceFactory::new(
        session.clone(),
        adapter,
        config,
    ));

    // Hold a boot lock so the loop survives until we are done driving it.
    let boot = session.acquire();

    let runner = {
        let session = session.clone();
        thread::spawn(move || session.run(factory))
    };

    // Activate a client object the way an external caller would.
    let service = loop {
        match broker.activate() {
            Ok(service) => break service,
            Err(_) => thread::yield_now(),
        }
    };

    let output = service
        .run_command("demo", "uname -a")
        .expect("command should run");
    print!("demo$ uname -a\n{output}");

    let exit = service
        .launcher()
        .run_command(
            &LaunchRequest::new("demo", "printf 'streamed '; printf 'chunks\n' 1>&2"),
            None,
            |chunk| print!("[stdout] {}", String::from_utf8_lossy(chunk)),
            |chunk| print!("[stderr] {}", String::from_utf8_lossy(chunk)),
        )
        .expect("streamed command should run");
    println!("exit code: {}", exit.exit_code);

    // Releasing the last client object shuts the service down.
    drop(service);
    drop(boot);

    runner
        .join()
        .expect("run thread should not panic")
        .expect("service should shut down cleanly");
    println!("service stopped: {:?}", session.state());
}
