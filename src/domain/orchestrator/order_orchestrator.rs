use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::activity::activity::Activity;
use crate::domain::allocator::composite_allocator::CompositeAllocator;
use crate::domain::manager::equipment_manager::EquipmentManager;
use crate::domain::manager::reservation_book::ReservationId;
use crate::domain::manager::resource_manager::{AllocatedUnit, AllocationRequest, ResourceManager};
use crate::domain::order::order::Order;
use crate::domain::orchestrator::rollback::rollback_order;
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::system::ProductionSystem;
use crate::domain::utils::id::{ActivityId, EquipmentId, OrderId, Timestamp, hhmm};
use crate::error::Error;

/// Where a promoted reservation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotedPlacement {
    pub equipment_id: EquipmentId,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A reservation an activity holds on a batching category instead of a committed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedSlot {
    pub category: EquipmentCategory,
    pub reservation_id: ReservationId,
    pub placement: Option<PromotedPlacement>,
}

impl ReservedSlot {
    pub fn is_promoted(&self) -> bool {
        self.placement.is_some()
    }
}

/// The outcome for one activity of the chain.
///
/// For an activity with reservations, `start`/`end` is the provisional window the rest of the chain
/// was planned around and `units` is empty. Once the group is promoted they hold the batch window,
/// the batching unit and the member's companions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedActivity {
    pub activity_id: ActivityId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub units: Vec<AllocatedUnit>,
    pub reservations: Vec<ReservedSlot>,
}

/// Committed and reserved windows of an order, in dependency order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    pub order_id: OrderId,
    pub activities: Vec<PlannedActivity>,
}

impl OrderPlan {
    pub fn uses_reservations(&self) -> bool {
        self.activities.iter().any(|activity| !activity.reservations.is_empty())
    }

    pub fn reservations(&self) -> impl Iterator<Item = (ActivityId, &ReservedSlot)> {
        self.activities.iter().flat_map(|activity| activity.reservations.iter().map(move |slot| (activity.activity_id, slot)))
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.activities.first().map(|activity| activity.start)
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.activities.last().map(|activity| activity.end)
    }
}

/// Which activity and resource kind made an order fail, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub order_id: OrderId,
    pub activity_id: Option<ActivityId>,
    pub activity_name: Option<String>,
    pub category: Option<String>,
    pub message: String,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {}", self.order_id)?;
        if let Some(activity_id) = self.activity_id {
            write!(f, " -> activity {}", activity_id)?;
            if let Some(name) = &self.activity_name {
                write!(f, " ({})", name)?;
            }
        }
        if let Some(category) = &self.category {
            write!(f, " -> {}", category)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Result of the allocation phase for one order. The status controller turns it into a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase1Outcome {
    /// Every activity committed directly.
    Allocated(OrderPlan),

    /// At least one activity holds a reservation waiting for its group.
    Restricted(OrderPlan),

    /// No feasible window; everything the order held has been released.
    Failed(FailureReport),

    /// Catalog or quantity error that no retry can fix.
    Invalid(FailureReport),

    Cancelled,
}

struct ChainFailure {
    activity_id: Option<ActivityId>,
    error: Error,
}

/// Walks an order's chain backward from its deadline and commits each activity before the
/// next one's start. A failure part way releases everything the order holds on the touched managers.
#[derive(Debug)]
pub struct OrderOrchestrator<'a> {
    system: &'a ProductionSystem,
}

impl<'a> OrderOrchestrator<'a> {
    pub fn new(system: &'a ProductionSystem) -> Self {
        Self { system }
    }

    pub fn allocate_order(&self, order: &Order, cancel: &AtomicBool) -> Phase1Outcome {
        let mut touched: Vec<&dyn ResourceManager> = Vec::new();

        match self.walk(order, cancel, &mut touched) {
            Ok(plan) if plan.uses_reservations() => {
                log::info!("Order {} allocated with reservations, waiting for grouping.", order.id);
                Phase1Outcome::Restricted(plan)
            }
            Ok(plan) => {
                log::info!(
                    "Order {} allocated from {} to {}.",
                    order.id,
                    plan.start().map(hhmm).unwrap_or_default(),
                    plan.end().map(hhmm).unwrap_or_default()
                );
                Phase1Outcome::Allocated(plan)
            }
            Err(failure) => {
                if !touched.is_empty() {
                    rollback_order(order.id, &touched);
                }

                let report = self.report(order.id, &failure);
                match failure.error {
                    Error::Cancelled(_) => {
                        log::info!("Allocation of order {} cancelled.", order.id);
                        Phase1Outcome::Cancelled
                    }
                    Error::AllocationFailed { .. } => {
                        log::warn!("Allocation failed: {}", report);
                        Phase1Outcome::Failed(report)
                    }
                    _ => {
                        log::error!("Order cannot be scheduled: {}", report);
                        Phase1Outcome::Invalid(report)
                    }
                }
            }
        }
    }

    fn report(&self, order_id: OrderId, failure: &ChainFailure) -> FailureReport {
        let activity_name = failure.activity_id.and_then(|id| self.system.activity(id).ok()).map(|activity| activity.name.clone());

        FailureReport {
            order_id,
            activity_id: failure.activity_id,
            activity_name,
            category: failure.error.failing_category().map(str::to_string),
            message: failure.error.to_string(),
        }
    }

    /// Earliest start of the activity: the shift start, tightened by the maximum wait before the next activity.
    fn lower_bound(order: &Order, activity: &Activity, next_start: Timestamp, duration: i64, is_last: bool) -> Timestamp {
        match activity.max_wait_s {
            Some(max_wait) if !is_last => order.shift_start.max(next_start - max_wait - duration),
            _ => order.shift_start,
        }
    }

    fn walk<'s>(&'s self, order: &Order, cancel: &AtomicBool, touched: &mut Vec<&'s dyn ResourceManager>) -> Result<OrderPlan, ChainFailure> {
        let mut planned: Vec<PlannedActivity> = Vec::with_capacity(order.activities.len());
        let mut next_start = order.deadline;

        for (position, activity_id) in order.activities.iter().enumerate().rev() {
            let at = |error: Error| ChainFailure { activity_id: Some(*activity_id), error };

            if cancel.load(Ordering::SeqCst) {
                return Err(at(Error::Cancelled(order.id)));
            }

            let activity = self.system.activity(*activity_id).map_err(at)?;
            let duration = activity.duration_for(order.quantity).map_err(at)?;
            let is_last = position + 1 == order.activities.len();
            let not_before = Self::lower_bound(order, activity, next_start, duration, is_last);
            let request = AllocationRequest::new(order.id, activity, order.quantity, not_before, next_start);

            let mut reserved: Vec<&EquipmentManager> = Vec::new();
            for category in activity.equipment_requirements.keys() {
                let manager = self.system.manager(*category).map_err(at)?;
                if manager.needs_reservation(activity, order.quantity) {
                    reserved.push(manager);
                }
            }

            // A reserved activity commits nothing here: its staff and other categories are placed on the
            // batch window when the group is promoted.
            let (start, end, units) = match reserved.as_slice() {
                [] => {
                    let direct = self.system.managers_for(activity, &[]).map_err(at)?;
                    let allocation = CompositeAllocator::new(direct.clone(), self.system.config().granularity_s).allocate(&request).map_err(at)?;
                    touched.extend(direct);
                    (allocation.start, allocation.end, allocation.units)
                }
                [manager] => {
                    if next_start - duration < not_before {
                        return Err(at(Error::AllocationFailed { activity_id: activity.id, category: manager.label(), quantity: order.quantity, not_after: next_start }));
                    }
                    (next_start - duration, next_start, Vec::new())
                }
                [_, second, ..] => {
                    log::warn!("Order {} activity {} would wait on two batching categories at once.", order.id, activity.id);
                    return Err(at(Error::AllocationFailed { activity_id: activity.id, category: second.label(), quantity: order.quantity, not_after: next_start }));
                }
            };

            let mut reservations = Vec::with_capacity(reserved.len());
            for manager in reserved {
                let reservation_id = manager.reserve(activity, order.id, order.quantity, not_before, next_start).map_err(at)?;
                touched.push(manager);
                reservations.push(ReservedSlot { category: manager.category(), reservation_id, placement: None });
            }

            log::debug!("Order {} activity {} planned from {} to {}.", order.id, activity.id, hhmm(start), hhmm(end));
            planned.push(PlannedActivity { activity_id: activity.id, start, end, units, reservations });
            next_start = start;
        }

        planned.reverse();

        // A promoted group may move within its reservation bounds; it must still start after the previous activity.
        for pair in planned.windows(2) {
            for slot in &pair[1].reservations {
                if let Ok(manager) = self.system.manager(slot.category) {
                    manager.tighten_reservation(slot.reservation_id, pair[0].end);
                }
            }
        }

        Ok(OrderPlan { order_id: order.id, activities: planned })
    }
}
