use serde::Deserialize;

pub const DEFAULT_GRANULARITY_S: i64 = 60;
pub const DEFAULT_RESERVATION_TIMEOUT_S: i64 = 600;
pub const DEFAULT_MAX_WAITING_PASSES: u32 = 3;
pub const DEFAULT_SEARCH_HORIZON_S: i64 = 24 * 3_600;

/// Tunables of the scheduling engine. Read from the optional `configuracao` section of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Step of the backward search in seconds.
    #[serde(rename = "granularidade_s")]
    pub granularity_s: i64,

    /// Reservation lifetime for batching categories that configure none.
    #[serde(rename = "timeout_reserva_padrao_s")]
    pub default_reservation_timeout_s: i64,

    /// Execution passes an order may stay below the grouping threshold before it is cancelled.
    /// Zero disables the limit; reservations then only end by expiry.
    #[serde(rename = "max_passagens_espera")]
    pub max_waiting_passes: u32,

    /// Lower bound of a standalone allocation, counted back from its `not_after`.
    #[serde(rename = "horizonte_busca_s")]
    pub search_horizon_s: i64,

    /// Worker threads of the allocation pass. One keeps placements reproducible.
    #[serde(rename = "threads")]
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            granularity_s: DEFAULT_GRANULARITY_S,
            default_reservation_timeout_s: DEFAULT_RESERVATION_TIMEOUT_S,
            max_waiting_passes: DEFAULT_MAX_WAITING_PASSES,
            search_horizon_s: DEFAULT_SEARCH_HORIZON_S,
            worker_threads: 1,
        }
    }
}

impl SchedulerConfig {
    /// Replaces nonsensical values by their defaults.
    pub fn sanitized(mut self) -> Self {
        if self.granularity_s <= 0 {
            log::warn!("Granularity {}s is not positive, using {}s.", self.granularity_s, DEFAULT_GRANULARITY_S);
            self.granularity_s = DEFAULT_GRANULARITY_S;
        }
        if self.default_reservation_timeout_s <= 0 {
            self.default_reservation_timeout_s = DEFAULT_RESERVATION_TIMEOUT_S;
        }
        if self.search_horizon_s <= 0 {
            self.search_horizon_s = DEFAULT_SEARCH_HORIZON_S;
        }
        self.worker_threads = self.worker_threads.max(1);
        self
    }
}
