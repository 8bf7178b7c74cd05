use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for reservation expiry and end-of-shift cleanup.
pub trait SystemSimulator: std::fmt::Debug + Send + Sync {
    fn get_current_time_in_s(&self) -> i64;
    fn get_current_time_in_ms(&self) -> i64;
}

#[derive(Debug)]
struct SimulatorState {
    is_simulation: bool,
    simulation_base_timestamp: i64,
    real_time_base_timestamp: i64,
}

/// Wall clock, optionally shifted so that the run starts at a chosen simulated instant
/// (e.g. the opening of the production shift) and advances in real time from there.
#[derive(Debug, Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimulatorState>>,
}

impl Simulator {
    /// Real wall clock.
    pub fn real_time() -> Simulator {
        let state = SimulatorState { is_simulation: false, simulation_base_timestamp: 0, real_time_base_timestamp: Self::get_system_time_ms() };
        Simulator { state: Arc::new(Mutex::new(state)) }
    }

    /// Simulated clock starting at `start_time_s`.
    pub fn starting_at(start_time_s: i64) -> Simulator {
        let state = SimulatorState {
            is_simulation: true,
            simulation_base_timestamp: start_time_s * 1000,
            real_time_base_timestamp: Self::get_system_time_ms(),
        };
        Simulator { state: Arc::new(Mutex::new(state)) }
    }

    fn get_system_time_ms() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_millis() as i64
    }
}

impl SystemSimulator for Simulator {
    fn get_current_time_in_s(&self) -> i64 {
        self.get_current_time_in_ms() / 1000
    }

    fn get_current_time_in_ms(&self) -> i64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.is_simulation {
            let current_real = Self::get_system_time_ms();
            state.simulation_base_timestamp + (current_real - state.real_time_base_timestamp)
        } else {
            Self::get_system_time_ms()
        }
    }
}
