//! ==============================================================================
//! scheduler.rs - single-slot periodic runner
//! ==============================================================================
//!
//! purpose:
//!     runs one task at a time, forever, with a delay after each run.
//!     the task decides the delay (normal cadence or a fault back-off).
//!
//! guarantees:
//!     - runs never overlap: the next run starts only after the previous
//!       one returned and its delay elapsed
//!     - a stop request is honoured between runs, never inside one
//!     - time comes from an injected Clock, so tests need no real sleeping
//!
//! ==============================================================================

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::watch;

/// source of delays
pub trait Clock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

pub struct TokioClock;

impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// work executed once per slot; returns how long to wait before the next run
pub trait PeriodicTask {
    fn run_once(&mut self) -> impl Future<Output = Duration>;
}

/// requests a stop; dropping every handle also stops the scheduler
#[derive(Clone)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

pub struct Scheduler<C> {
    clock: C,
    stop: watch::Receiver<bool>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> (Self, StopHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { clock, stop: rx }, StopHandle(tx))
    }

    /// runs until stopped, returns the number of completed runs
    pub async fn run<T: PeriodicTask>(&mut self, task: &mut T) -> u64 {
        let mut runs = 0;

        while !*self.stop.borrow_and_update() {
            let delay = task.run_once().await;
            runs += 1;

            tokio::select! {
                biased;
                _ = self.stop.changed() => break,
                _ = self.clock.sleep(delay) => {}
            }
        }

        tracing::debug!("scheduler stopped after {} runs", runs);
        runs
    }
}

/// resolves once `signal` fires. a signal that could not be registered never
/// resolves, so the node keeps sampling until it is killed
pub async fn stop_signal(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!("Stop signal unavailable, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
}
