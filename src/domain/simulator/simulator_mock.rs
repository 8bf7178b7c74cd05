use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::simulator::simulator::SystemSimulator;

/// Manually driven clock. Clones share the same time, so a test can keep one handle
/// and advance the clock seen by every manager.
#[derive(Debug, Clone)]
pub struct MockSimulator {
    time: Arc<RwLock<i64>>,
}

impl MockSimulator {
    pub fn new(time: i64) -> MockSimulator {
        MockSimulator { time: Arc::new(RwLock::new(time)) }
    }

    pub fn set_time(&self, time: i64) {
        *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
    }

    pub fn advance(&self, seconds: i64) {
        *self.time.write().unwrap_or_else(PoisonError::into_inner) += seconds;
    }
}

impl SystemSimulator for MockSimulator {
    fn get_current_time_in_s(&self) -> i64 {
        *self.time.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_current_time_in_ms(&self) -> i64 {
        self.get_current_time_in_s() * 1000
    }
}
