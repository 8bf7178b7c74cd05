use std::fmt::Debug;

use crate::domain::activity::activity::Activity;
use crate::domain::utils::id::{ActivityId, EquipmentId, OrderId, StaffId, Timestamp};
use crate::error::Result;

/// One bounded allocation request of an order's activity.
///
/// The committed window `[start, end)` always satisfies `not_before <= start` and `end <= not_after`.
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    pub order_id: OrderId,
    pub activity: &'a Activity,
    pub quantity: i64,
    pub not_before: Timestamp,
    pub not_after: Timestamp,
}

impl<'a> AllocationRequest<'a> {
    pub fn new(order_id: OrderId, activity: &'a Activity, quantity: i64, not_before: Timestamp, not_after: Timestamp) -> Self {
        Self { order_id, activity, quantity, not_before, not_after }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AllocatedUnit {
    Equipment(EquipmentId),
    Staff(StaffId),
}

/// A committed window on one or more units of a single manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub activity_id: ActivityId,
    pub units: Vec<AllocatedUnit>,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Allocate/release contract shared by the equipment managers and the staff pool.
///
/// Every implementation serialises the check-and-commit of its own units; two managers never share a lock.
pub trait ResourceManager: Debug + Send + Sync {
    /// Short name used in logs, statistics and failure chains (e.g. "ovens", "staff").
    fn label(&self) -> String;

    /// Backward search for the latest feasible window of the request.
    fn allocate(&self, request: &AllocationRequest) -> Result<Allocation>;

    /// Commits exactly `[start, end)` if some set of candidates can host it, else changes nothing.
    fn place_window(&self, request: &AllocationRequest, start: Timestamp, end: Timestamp) -> Option<Allocation>;

    /// Drops everything held for the order (occupations and pending reservations). Idempotent.
    fn release_by_order(&self, order_id: OrderId) -> usize;

    /// Drops what the order holds for one activity. Idempotent.
    fn release_by_activity(&self, activity_id: ActivityId, order_id: OrderId) -> usize;

    /// Drops occupations that ended at or before `now`.
    fn release_finished(&self, now: Timestamp) -> usize;
}

/// Resources an activity needs besides its batching category.
///
/// A promoted group calls `place` once per member on the group's window, so every member holds
/// its staff and other units for exactly the time the batch runs.
pub trait CompanionPlacer {
    /// Commits the member's other resources on `[start, end)`, all or nothing.
    fn place(&self, order_id: OrderId, quantity: i64, start: Timestamp, end: Timestamp) -> Option<Vec<AllocatedUnit>>;

    /// Drops what `place` committed for the member. Idempotent.
    fn release(&self, order_id: OrderId);
}

/// Activities that need nothing besides their batching category.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompanions;

impl CompanionPlacer for NoCompanions {
    fn place(&self, _order_id: OrderId, _quantity: i64, _start: Timestamp, _end: Timestamp) -> Option<Vec<AllocatedUnit>> {
        Some(Vec::new())
    }

    fn release(&self, _order_id: OrderId) {}
}

/// Trial windows of a backward search: latest first, stepping back by `granularity_s`
/// until the window would start before `not_before`.
pub fn backward_windows(not_before: Timestamp, not_after: Timestamp, duration_s: i64, granularity_s: i64) -> impl Iterator<Item = (Timestamp, Timestamp)> {
    let step = granularity_s.max(1);
    let latest_end = not_after;

    (0..)
        .map(move |i: i64| latest_end - i * step)
        .take_while(move |end| end - duration_s >= not_before)
        .map(move |end| (end - duration_s, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_step_backward_down_to_the_lower_bound() {
        let windows: Vec<_> = backward_windows(0, 300, 100, 60).collect();
        assert_eq!(windows, vec![(200, 300), (140, 240), (80, 180), (20, 120)]);
    }

    #[test]
    fn no_window_when_the_duration_does_not_fit() {
        assert_eq!(backward_windows(250, 300, 100, 60).count(), 0);
    }

    #[test]
    fn exact_fit_is_tried() {
        let windows: Vec<_> = backward_windows(200, 300, 100, 60).collect();
        assert_eq!(windows, vec![(200, 300)]);
    }
}
