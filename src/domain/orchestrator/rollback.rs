use std::collections::BTreeSet;

use crate::domain::manager::resource_manager::ResourceManager;
use crate::domain::utils::id::OrderId;
use crate::domain::utils::statistics::{StatParameter, StatisticEvent, add_global_event};

/// Compensating action for a partially allocated order: releases everything the order holds
/// on each touched manager. A manager with nothing to release is reported, not treated as an error.
pub fn rollback_order(order_id: OrderId, touched: &[&dyn ResourceManager]) -> usize {
    let mut visited = BTreeSet::new();
    let mut released = 0;

    for manager in touched {
        let label = manager.label();
        if !visited.insert(label.clone()) {
            continue;
        }

        let count = manager.release_by_order(order_id);
        if count == 0 {
            tracing::warn!(order = %order_id, manager = %label, "rollback found nothing to release");
        }
        released += count;
    }

    tracing::info!(order = %order_id, managers = visited.len(), released, "order rolled back");

    let mut event = StatisticEvent::new("Rollback");
    event.set(StatParameter::Order, order_id.value()).set(StatParameter::Outcome, released);
    add_global_event(event);

    released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::manager::resource_manager::{Allocation, AllocationRequest};
    use crate::domain::utils::id::{ActivityId, Timestamp};
    use crate::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Holding {
        name: &'static str,
        held: AtomicUsize,
    }

    impl ResourceManager for Holding {
        fn label(&self) -> String {
            self.name.to_string()
        }

        fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
            Ok(Allocation { activity_id: request.activity.id, units: Vec::new(), start: request.not_before, end: request.not_after })
        }

        fn place_window(&self, _request: &AllocationRequest, _start: Timestamp, _end: Timestamp) -> Option<Allocation> {
            None
        }

        fn release_by_order(&self, _order_id: OrderId) -> usize {
            self.held.swap(0, Ordering::SeqCst)
        }

        fn release_by_activity(&self, _activity_id: ActivityId, order_id: OrderId) -> usize {
            self.release_by_order(order_id)
        }

        fn release_finished(&self, _now: Timestamp) -> usize {
            0
        }
    }

    #[traced_test]
    #[test]
    fn each_manager_is_released_once() {
        let ovens = Holding { name: "ovens", held: AtomicUsize::new(2) };
        let staff = Holding { name: "staff", held: AtomicUsize::new(1) };
        let touched: Vec<&dyn ResourceManager> = vec![&ovens, &staff, &ovens];

        assert_eq!(rollback_order(OrderId::new(4), &touched), 3);
        assert!(!logs_contain("rollback found nothing to release"));
    }

    #[traced_test]
    #[test]
    fn empty_managers_are_reported_as_warnings() {
        let mixers = Holding { name: "mixers", held: AtomicUsize::new(0) };
        let touched: Vec<&dyn ResourceManager> = vec![&mixers];

        assert_eq!(rollback_order(OrderId::new(4), &touched), 0);
        assert!(logs_contain("rollback found nothing to release"));
    }
}
