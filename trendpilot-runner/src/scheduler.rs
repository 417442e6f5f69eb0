//! Wall-clock scheduling for the live loop and the collector.
//!
//! Cycles fire at fixed UTC boundaries (minutes 0/15/30/45 by default). The
//! wait target is recomputed from the wall clock before every sleep, so
//! drift never accumulates. Sleeps are interruptible by Ctrl-C through a
//! small current-thread tokio runtime that exists only for that purpose.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// First boundary strictly after `now`. Boundaries are the minutes of the
/// hour divisible by `quarter_minutes`, at second zero.
pub fn next_boundary(now: DateTime<Utc>, quarter_minutes: u32) -> DateTime<Utc> {
    let step = Duration::minutes(i64::from(quarter_minutes.max(1)));
    // duration_trunc only fails for out-of-range timestamps.
    let floor = now.duration_trunc(step).unwrap_or(now);
    floor + step
}

/// Whether `now` lies within `window_secs` after a boundary.
pub fn in_trigger_window(now: DateTime<Utc>, quarter_minutes: u32, window_secs: u32) -> bool {
    now.minute() % quarter_minutes.max(1) == 0 && now.second() < window_secs
}

/// How often the scheduler fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Align to wall-clock boundaries.
    Quarter { minutes: u32, window_secs: u32 },
    /// Fixed poll period (test mode).
    Poll(StdDuration),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Run a cycle now.
    Due(DateTime<Utc>),
    /// An interrupt arrived; stop the loop.
    Shutdown,
}

/// Cloneable trigger that stops a [`Scheduler`] from another place (tests,
/// or the CLI wiring a second signal source).
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

pub struct Scheduler {
    cadence: Cadence,
    runtime: Runtime,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    /// Build the scheduler and start listening for Ctrl-C.
    pub fn new(cadence: Cadence) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);

        let signal_tx = Arc::clone(&tx);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down after the current step");
                signal_tx.send_replace(true);
            }
        });

        Ok(Self {
            cadence,
            runtime,
            shutdown_tx: tx,
            shutdown_rx: rx,
        })
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Block until the next cycle is due or shutdown is requested.
    pub fn next_tick(&mut self) -> Tick {
        match self.cadence {
            Cadence::Poll(period) => {
                if self.sleep(period) {
                    Tick::Shutdown
                } else {
                    Tick::Due(Utc::now())
                }
            }
            Cadence::Quarter {
                minutes,
                window_secs,
            } => loop {
                let now = Utc::now();
                let target = next_boundary(now, minutes);
                let wait = (target - now).to_std().unwrap_or(StdDuration::ZERO);
                debug!(target = %target, wait_secs = wait.as_secs_f64(), "waiting for boundary");
                if self.sleep(wait) {
                    return Tick::Shutdown;
                }

                let woke = Utc::now();
                if in_trigger_window(woke, minutes, window_secs) {
                    return Tick::Due(woke);
                }
                warn!(target = %target, woke = %woke, "woke outside the trigger window, realigning");
            },
        }
    }

    /// Interruptible sleep. Returns true if shutdown was requested.
    fn sleep(&mut self, period: StdDuration) -> bool {
        let rx = &mut self.shutdown_rx;
        self.runtime.block_on(async {
            if *rx.borrow() {
                return true;
            }
            let interrupted = tokio::select! {
                _ = tokio::time::sleep(period) => false,
                changed = rx.wait_for(|stop| *stop) => changed.is_ok(),
            };
            interrupted || *rx.borrow()
        })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cadence", &self.cadence)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
