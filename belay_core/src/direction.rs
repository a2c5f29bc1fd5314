//! Net extrusion direction detection from committed motion.
//!
//! The monitor is polled by a host timer. Each tick that finds a queued move
//! registers a one-shot flush callback; when the motion planner commits that
//! move, its extruder end position is compared with the previously committed
//! one. Subscribers are told only when the direction actually reverses.
//!
//! One monitor is created at start-up and shared by handle between every
//! belay. All access happens on the host event loop thread.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use belay_traits::MotionPlan;

use crate::error::{BuildError, Result};

/// Callback invoked with the new direction (`true` = forward).
pub type DirectionCallback = Box<dyn FnMut(bool)>;

struct MonitorState {
    update_interval: f64,
    last_direction: bool,
    last_flushed_position: f64,
    // Toggled whenever a flush is processed; callbacks carrying the old
    // value are stale.
    flush_id: bool,
    subscribers: Vec<DirectionCallback>,
}

/// Shared handle to the process-wide direction monitor.
#[derive(Clone)]
pub struct DirectionMonitor {
    inner: Rc<RefCell<MonitorState>>,
}

impl core::fmt::Debug for DirectionMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.inner.borrow();
        f.debug_struct("DirectionMonitor")
            .field("update_interval", &st.update_interval)
            .field("last_direction", &st.last_direction)
            .field("last_flushed_position", &st.last_flushed_position)
            .field("subscribers", &st.subscribers.len())
            .finish()
    }
}

impl Default for DirectionMonitor {
    fn default() -> Self {
        Self::from_state(belay_config::DEFAULT_UPDATE_INTERVAL)
    }
}

impl DirectionMonitor {
    pub fn new(update_interval: f64) -> Result<Self> {
        if !(update_interval.is_finite() && update_interval > 0.0) {
            return Err(BuildError::invalid(
                "direction.update_interval",
                "must be > 0",
            ));
        }
        Ok(Self::from_state(update_interval))
    }

    fn from_state(update_interval: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MonitorState {
                update_interval,
                last_direction: true,
                last_flushed_position: 0.0,
                flush_id: true,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Append a subscriber. Subscribers are called in registration order.
    pub fn subscribe(&self, callback: impl FnMut(bool) + 'static) {
        self.inner.borrow_mut().subscribers.push(Box::new(callback));
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Current net direction (`true` = forward).
    pub fn direction(&self) -> bool {
        self.inner.borrow().last_direction
    }

    pub fn last_flushed_position(&self) -> f64 {
        self.inner.borrow().last_flushed_position
    }

    pub fn update_interval(&self) -> f64 {
        self.inner.borrow().update_interval
    }

    /// Timer callback. Schedules a flush check when a move is queued and
    /// returns the next wake-up time. Never waits for the flush itself.
    pub fn tick(&self, eventtime: f64, plan: &mut dyn MotionPlan) -> f64 {
        let (token, interval) = {
            let st = self.inner.borrow();
            (st.flush_id, st.update_interval)
        };
        if plan.last_queued_move().is_some() {
            let weak: Weak<RefCell<MonitorState>> = Rc::downgrade(&self.inner);
            plan.register_flush_callback(Box::new(move |end_position| {
                if let Some(inner) = weak.upgrade() {
                    DirectionMonitor { inner }.handle_flush(end_position, token);
                }
            }));
        }
        eventtime + interval
    }

    fn handle_flush(&self, end_position: f64, token: bool) {
        let direction = {
            let mut st = self.inner.borrow_mut();
            if st.flush_id != token {
                tracing::trace!(end_position, "direction: stale flush callback ignored");
                return;
            }
            if !end_position.is_finite() {
                tracing::warn!(end_position, "direction: non-finite committed position ignored");
                return;
            }
            st.flush_id = !st.flush_id;
            let direction = end_position >= st.last_flushed_position;
            if direction == st.last_direction {
                st.last_flushed_position = end_position;
                return;
            }
            direction
        };

        tracing::debug!(direction, end_position, "direction: net extrusion direction changed");
        // Subscribers run without the state borrowed so they may query the monitor.
        let mut subscribers = std::mem::take(&mut self.inner.borrow_mut().subscribers);
        for callback in &mut subscribers {
            callback(direction);
        }
        let mut st = self.inner.borrow_mut();
        subscribers.append(&mut st.subscribers);
        st.subscribers = subscribers;
        st.last_direction = direction;
        st.last_flushed_position = end_position;
    }
}
