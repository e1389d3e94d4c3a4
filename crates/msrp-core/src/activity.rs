//! Session activity monitoring
//!
//! Every chunk sent or received resets the last-activity instant. A periodic
//! check compares the idle time with the threshold and fires the inactivity
//! callback once, after which the monitor stays disarmed until restarted.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

struct ActivityState {
    last_activity: Instant,
    armed: bool,
}

struct ActivityInner {
    idle_threshold: Duration,
    check_interval: Duration,
    state: Mutex<ActivityState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks activity on one transport channel
#[derive(Clone)]
pub struct ActivityMonitor {
    inner: Arc<ActivityInner>,
}

impl ActivityMonitor {
    /// A zero `idle_threshold` disables inactivity detection
    pub fn new(idle_threshold: Duration, check_interval: Duration) -> Self {
        Self {
            inner: Arc::new(ActivityInner {
                idle_threshold,
                check_interval: if check_interval.is_zero() {
                    DEFAULT_CHECK_INTERVAL
                } else {
                    check_interval
                },
                state: Mutex::new(ActivityState {
                    last_activity: Instant::now(),
                    armed: false,
                }),
                task: Mutex::new(None),
            }),
        }
    }

    /// Record activity now
    pub fn update(&self) {
        self.inner.state.lock().last_activity = Instant::now();
    }

    /// Time since the last recorded activity
    pub fn idle_time(&self) -> Duration {
        self.inner.state.lock().last_activity.elapsed()
    }

    pub fn idle_threshold(&self) -> Duration {
        self.inner.idle_threshold
    }

    /// Whether a check task is currently armed
    pub fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Start watching; `on_inactivity` runs at most once
    ///
    /// Calling `start` on a running monitor does nothing.
    pub fn start<F>(&self, on_inactivity: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.idle_threshold.is_zero() {
            debug!("Activity monitor disabled (zero idle threshold)");
            return;
        }

        let mut task = self.inner.task.lock();
        if task.as_ref().map_or(false, |t| !t.is_finished()) {
            return;
        }

        {
            let mut state = self.inner.state.lock();
            state.last_activity = Instant::now();
            state.armed = true;
        }

        debug!(
            "Starting activity monitor (idle threshold {:?}, check every {:?})",
            self.inner.idle_threshold, self.inner.check_interval
        );
        let weak = Arc::downgrade(&self.inner);
        let check_interval = self.inner.check_interval;
        let idle_threshold = self.inner.idle_threshold;
        *task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut on_inactivity = Some(on_inactivity);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let fire = {
                    let mut state = inner.state.lock();
                    if state.armed && state.last_activity.elapsed() >= idle_threshold {
                        state.armed = false;
                        true
                    } else {
                        false
                    }
                };
                drop(inner);
                if fire {
                    info!("No activity for {:?}, raising inactivity event", idle_threshold);
                    if let Some(callback) = on_inactivity.take() {
                        callback();
                    }
                    break;
                }
            }
        }));
    }

    /// Stop watching; stopping a stopped monitor does nothing
    pub fn stop(&self) {
        if let Some(task) = self.inner.task.lock().take() {
            debug!("Stopping activity monitor");
            task.abort();
        }
        self.inner.state.lock().armed = false;
    }
}

impl std::fmt::Debug for ActivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityMonitor")
            .field("idle_threshold", &self.inner.idle_threshold)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for ActivityInner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
