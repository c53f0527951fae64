//! Periodic expiry of the known-good protocol.
//!
//! The check is level-triggered: each tick compares the stored timestamp
//! against the wall clock, so a missed or delayed tick is caught up by the
//! next one. Once the known-good protocol expires the task stops; the next
//! successful connection re-arms it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info};

use crate::config::EXPIRY_TICK_MS;
use crate::selector::Selector;

pub struct ResetScheduler {
    selector: Arc<Selector>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ResetScheduler {
    pub fn new(selector: Arc<Selector>) -> Self {
        Self::with_period(selector, Duration::from_millis(EXPIRY_TICK_MS))
    }

    pub fn with_period(selector: Arc<Selector>, period: Duration) -> Self {
        Self {
            selector,
            period,
            task: Mutex::new(None),
        }
    }

    /// Start ticking, replacing any running task. Must be called from
    /// within a tokio runtime.
    pub fn arm(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.take() {
            previous.abort();
        }
        debug!("expiry check armed every {}s", self.period.as_secs());
        *task = Some(tokio::spawn(run_expiry_checks(
            self.selector.clone(),
            self.period,
        )));
    }

    pub fn disarm(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_expiry_checks(selector: Arc<Selector>, period: Duration) {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        timer.tick().await;
        if selector.on_good_protocol_expiry_check() {
            info!("good protocol expired, expiry check stopped");
            break;
        }
    }
}
