//! Background memory reporter.
//!
//! Runs on its own thread and only reads process and system memory figures.
//! It holds no reference to strategy state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sysinfo::{Pid, System};
use tracing::{debug, info, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    /// System RAM in use, percent.
    pub system_percent: f64,
    /// Resident memory of this process, MB.
    pub process_mb: f64,
}

impl MemorySample {
    pub fn is_high(&self, warn_mb: u64) -> bool {
        self.process_mb > warn_mb as f64
    }
}

/// Reads memory figures for the current process.
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let system_percent = if total == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total as f64 * 100.0
        };

        let process_mb = match self.pid {
            Some(pid) => {
                self.system.refresh_process(pid);
                self.system
                    .process(pid)
                    .map(|p| p.memory() as f64 / BYTES_PER_MB)
                    .unwrap_or(0.0)
            }
            None => 0.0,
        };

        MemorySample {
            system_percent,
            process_mb,
        }
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the reporter thread. Dropping it stops the thread.
pub struct MemoryMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryMonitor {
    pub fn spawn(interval: Duration, warn_mb: u64) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("memory-monitor".into())
            .spawn(move || {
                let mut probe = MemoryProbe::new();
                while !flag.load(Ordering::Relaxed) {
                    let sample = probe.sample();
                    if sample.is_high(warn_mb) {
                        warn!(
                            system_percent = %format!("{:.1}", sample.system_percent),
                            process_mb = %format!("{:.1}", sample.process_mb),
                            warn_mb,
                            "high memory usage"
                        );
                    } else {
                        info!(
                            system_percent = %format!("{:.1}", sample.system_percent),
                            process_mb = %format!("{:.1}", sample.process_mb),
                            "memory"
                        );
                    }
                    thread::park_timeout(interval);
                }
                debug!("memory monitor stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
