//! Operator introspection via Unix signals: SIGUSR1 dumps probe status,
//! SIGUSR2 dumps runtime diagnostics for hang analysis.

#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use std::time::Instant;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
#[cfg(unix)]
use tracing::error;

#[cfg(unix)]
use crate::fleet::FleetRegistry;

#[cfg(unix)]
pub fn spawn(registry: Arc<FleetRegistry>) {
    tokio::spawn(async move {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                error!("cannot install SIGUSR1 handler: {}", e);
                return;
            }
        };
        let mut usr2 = match signal(SignalKind::user_defined2()) {
            Ok(s) => s,
            Err(e) => {
                error!("cannot install SIGUSR2 handler: {}", e);
                return;
            }
        };

        let started = Instant::now();
        loop {
            tokio::select! {
                _ = usr1.recv() => {
                    println!("{}", registry.status_report().await);
                }
                _ = usr2.recv() => {
                    print_runtime_diagnostics(started);
                }
            }
        }
    });
}

#[cfg(unix)]
fn print_runtime_diagnostics(started: Instant) {
    let metrics = tokio::runtime::Handle::current().metrics();
    println!("-- runtime diagnostics:");
    println!("uptime: {:?}", started.elapsed());
    println!("worker threads: {}", metrics.num_workers());
    println!("alive tasks: {}", metrics.num_alive_tasks());
}
