//! Background input sampling.
//!
//! Spawns a thread that owns a digital input, polls it at a fixed rate and
//! forwards state changes as `(time, state)` pairs over a bounded channel.
//! The event loop drains the channel and hands the edges to
//! `Belay::handle_switch`; the core itself never sees the thread.
//!
//! Each `Sampler` spawns exactly one thread, shut down when the `Sampler`
//! is dropped.
use crossbeam_channel as xch;
use belay_traits::DigitalInput;
use belay_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Edges buffered before the sampler starts dropping them.
pub const EDGE_CAPACITY: usize = 64;

pub struct Sampler {
    rx: xch::Receiver<(f64, bool)>,
    errors: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Sampler {
    /// Poll `input` at `hz` and report every change of state. The first
    /// successful read is always reported.
    pub fn spawn_switch<D, C>(mut input: D, hz: u32, clock: C) -> Self
    where
        D: DigitalInput + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(EDGE_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let errors = Arc::new(AtomicU64::new(0));
        let errors_clone = errors.clone();
        let period = Duration::from_millis(crate::util::period_ms(hz));

        let join_handle = std::thread::spawn(move || {
            let mut last: Option<bool> = None;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("sampler thread received shutdown signal");
                    break;
                }

                match input.is_high() {
                    Ok(state) if last != Some(state) => {
                        last = Some(state);
                        match tx.try_send((clock.now(), state)) {
                            Ok(()) => {}
                            Err(xch::TrySendError::Full(_)) => {
                                tracing::warn!(state, "sampler queue full; edge dropped");
                            }
                            Err(xch::TrySendError::Disconnected(_)) => {
                                tracing::debug!("sampler consumer disconnected, exiting thread");
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        errors_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(error = %e, "switch read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("sampler thread exiting cleanly");
        });

        Self {
            rx,
            errors,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// All edges received since the last call, oldest first.
    pub fn drain(&self) -> Vec<(f64, bool)> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next edge.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(f64, bool)> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Number of failed reads so far.
    pub fn read_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("sampler thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "sampler thread panicked during shutdown");
                }
            }
        }
    }
}
