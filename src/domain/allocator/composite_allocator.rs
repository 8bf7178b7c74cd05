use crate::domain::activity::activity::Activity;
use crate::domain::manager::resource_manager::{AllocatedUnit, AllocationRequest, CompanionPlacer, ResourceManager, backward_windows};
use crate::domain::utils::id::{OrderId, Timestamp};
use crate::error::{Error, Result};

/// Joint placement of one activity on every resource kind it needs at the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeAllocation {
    pub start: Timestamp,
    pub end: Timestamp,
    pub units: Vec<AllocatedUnit>,
}

/// Chains several managers (equipment categories and staff) so that an activity holds all of
/// them in one common window. Each trial window is committed manager by manager; a manager that
/// cannot host it undoes the peers already committed for that window before the next trial.
#[derive(Debug)]
pub struct CompositeAllocator<'a> {
    managers: Vec<&'a dyn ResourceManager>,
    granularity_s: i64,
}

impl<'a> CompositeAllocator<'a> {
    pub fn new(managers: Vec<&'a dyn ResourceManager>, granularity_s: i64) -> Self {
        Self { managers, granularity_s }
    }

    pub fn managers(&self) -> &[&'a dyn ResourceManager] {
        &self.managers
    }

    /// Latest common window at or before `request.not_after`.
    pub fn allocate(&self, request: &AllocationRequest) -> Result<CompositeAllocation> {
        if let [single] = self.managers.as_slice() {
            let allocation = single.allocate(request)?;
            return Ok(CompositeAllocation { start: allocation.start, end: allocation.end, units: allocation.units });
        }

        let duration = request.activity.duration_for(request.quantity)?;
        let mut blocking = self.managers.first().map(|manager| manager.label());

        for (start, end) in backward_windows(request.not_before, request.not_after, duration, self.granularity_s) {
            match self.place_window(request, start, end) {
                Ok(allocation) => return Ok(allocation),
                Err(label) => blocking = Some(label),
            }
        }

        Err(Error::AllocationFailed {
            activity_id: request.activity.id,
            category: blocking.unwrap_or_else(|| "none".to_string()),
            quantity: request.quantity,
            not_after: request.not_after,
        })
    }

    /// Commits `[start, end)` on every manager or on none. On refusal returns the label of the
    /// manager that could not host the window.
    pub fn place_window(&self, request: &AllocationRequest, start: Timestamp, end: Timestamp) -> std::result::Result<CompositeAllocation, String> {
        let mut committed: Vec<&dyn ResourceManager> = Vec::with_capacity(self.managers.len());
        let mut units = Vec::new();

        for manager in &self.managers {
            match manager.place_window(request, start, end) {
                Some(allocation) => {
                    committed.push(*manager);
                    units.extend(allocation.units);
                }
                None => {
                    for peer in committed {
                        peer.release_by_activity(request.activity.id, request.order_id);
                    }
                    return Err(manager.label());
                }
            }
        }

        Ok(CompositeAllocation { start, end, units })
    }
}

/// The managers of an activity other than its batching category, placed per member of a promoted group.
#[derive(Debug)]
pub struct GroupCompanions<'a> {
    allocator: CompositeAllocator<'a>,
    activity: &'a Activity,
}

impl<'a> GroupCompanions<'a> {
    pub fn new(managers: Vec<&'a dyn ResourceManager>, activity: &'a Activity, granularity_s: i64) -> Self {
        Self { allocator: CompositeAllocator::new(managers, granularity_s), activity }
    }
}

impl CompanionPlacer for GroupCompanions<'_> {
    fn place(&self, order_id: OrderId, quantity: i64, start: Timestamp, end: Timestamp) -> Option<Vec<AllocatedUnit>> {
        let request = AllocationRequest::new(order_id, self.activity, quantity, start, end);
        match self.allocator.place_window(&request, start, end) {
            Ok(allocation) => Some(allocation.units),
            Err(label) => {
                log::debug!("No {} free for order {} activity {} on the batch window.", label, order_id, self.activity.id);
                None
            }
        }
    }

    fn release(&self, order_id: OrderId) {
        for manager in self.allocator.managers() {
            manager.release_by_activity(self.activity.id, order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::activity::Activity;
    use crate::domain::activity::duration::{DurationBand, DurationTable};
    use crate::domain::manager::resource_manager::Allocation;
    use crate::domain::utils::id::{ActivityId, OrderId};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// Manager that accepts any window ending at or before `free_until` and remembers what it holds.
    #[derive(Debug)]
    struct WindowLimited {
        name: &'static str,
        free_until: Timestamp,
        held: Mutex<Vec<(Timestamp, Timestamp)>>,
    }

    impl WindowLimited {
        fn new(name: &'static str, free_until: Timestamp) -> Self {
            Self { name, free_until, held: Mutex::new(Vec::new()) }
        }
    }

    impl ResourceManager for WindowLimited {
        fn label(&self) -> String {
            self.name.to_string()
        }

        fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
            let duration = request.activity.duration_for(request.quantity)?;
            let end = request.not_after.min(self.free_until);
            self.place_window(request, end - duration, end).ok_or(Error::AllocationFailed {
                activity_id: request.activity.id,
                category: self.label(),
                quantity: request.quantity,
                not_after: request.not_after,
            })
        }

        fn place_window(&self, request: &AllocationRequest, start: Timestamp, end: Timestamp) -> Option<Allocation> {
            if end > self.free_until {
                return None;
            }
            self.held.lock().unwrap().push((start, end));
            Some(Allocation { activity_id: request.activity.id, units: Vec::new(), start, end })
        }

        fn release_by_order(&self, _order_id: OrderId) -> usize {
            std::mem::take(&mut *self.held.lock().unwrap()).len()
        }

        fn release_by_activity(&self, _activity_id: ActivityId, order_id: OrderId) -> usize {
            self.release_by_order(order_id)
        }

        fn release_finished(&self, _now: Timestamp) -> usize {
            0
        }
    }

    fn activity() -> Activity {
        Activity {
            id: ActivityId::new(1),
            name: "pesagem".to_string(),
            kind: "PESAGEM".to_string(),
            equipment_requirements: BTreeMap::new(),
            eligible_equipment: Vec::new(),
            equipment_fips: HashMap::new(),
            configurations: HashMap::new(),
            staff_types: Vec::new(),
            staff_count: 0,
            durations: DurationTable::new(vec![DurationBand { quantity_min: 1, quantity_max: 100, duration_s: 60 }]).unwrap(),
            max_wait_s: None,
        }
    }

    #[test]
    fn common_window_respects_the_most_constrained_manager() {
        let bench = WindowLimited::new("benches", 1_000);
        let scale = WindowLimited::new("scales", 700);
        let managers: Vec<&dyn ResourceManager> = vec![&bench, &scale];
        let allocator = CompositeAllocator::new(managers, 60);
        let activity = activity();

        let allocation = allocator.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 10, 0, 1_000)).unwrap();
        assert!(allocation.end <= 700);
        assert_eq!(bench.held.lock().unwrap().as_slice(), &[(allocation.start, allocation.end)]);
        assert_eq!(scale.held.lock().unwrap().len(), 1);
    }

    #[test]
    fn failure_names_the_blocking_manager() {
        let bench = WindowLimited::new("benches", 1_000);
        let scale = WindowLimited::new("scales", 0);
        let managers: Vec<&dyn ResourceManager> = vec![&bench, &scale];
        let allocator = CompositeAllocator::new(managers, 60);
        let activity = activity();

        let error = allocator.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 10, 0, 1_000)).unwrap_err();
        assert_eq!(error.failing_category(), Some("scales"));
        assert!(bench.held.lock().unwrap().is_empty());
    }

    #[test]
    fn companions_take_the_exact_window_or_nothing() {
        let bench = WindowLimited::new("benches", 1_000);
        let scale = WindowLimited::new("scales", 700);
        let activity = activity();
        let companions = GroupCompanions::new(vec![&bench, &scale], &activity, 60);

        assert!(companions.place(OrderId::new(1), 10, 940, 1_000).is_none());
        assert!(bench.held.lock().unwrap().is_empty());

        assert!(companions.place(OrderId::new(1), 10, 640, 700).is_some());
        assert_eq!(bench.held.lock().unwrap().as_slice(), &[(640, 700)]);

        companions.release(OrderId::new(1));
        assert!(bench.held.lock().unwrap().is_empty());
        assert!(scale.held.lock().unwrap().is_empty());
    }
}
