use slotmap::{SlotMap, new_key_type};
use std::collections::BTreeMap;

use crate::domain::manager::resource_manager::AllocatedUnit;
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::utils::id::{ActivityId, EquipmentId, OrderId, Timestamp};

new_key_type! {
    pub struct ReservationId;
}

/// A provisional, minimum-exempt claim of an order on a category's capacity.
///
/// Reservations take no part in capacity accounting until their group is promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub order_id: OrderId,
    pub activity_id: ActivityId,
    pub quantity: i64,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,

    /// Earliest start the promoted occupation may take for this order.
    pub not_before: Timestamp,

    /// Latest end the promoted occupation may take for this order.
    pub not_after: Timestamp,
}

impl Reservation {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at < now
    }
}

/// Reservations of one category, grouped by activity in arrival order.
#[derive(Debug, Default)]
pub struct ReservationBook {
    entries: SlotMap<ReservationId, Reservation>,
    by_activity: BTreeMap<ActivityId, Vec<ReservationId>>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reservation: Reservation) -> ReservationId {
        let activity_id = reservation.activity_id;
        let id = self.entries.insert(reservation);
        self.by_activity.entry(activity_id).or_default().push(id);
        id
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: ReservationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending reservations of one activity in arrival order.
    pub fn group(&self, activity_id: ActivityId) -> Vec<(ReservationId, &Reservation)> {
        self.by_activity
            .get(&activity_id)
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(*id).map(|reservation| (*id, reservation))).collect())
            .unwrap_or_default()
    }

    /// Activities that currently have at least one pending reservation.
    pub fn activities(&self) -> Vec<ActivityId> {
        self.by_activity.keys().copied().collect()
    }

    /// Raises the earliest start of a reservation. Never lowers it.
    pub fn tighten_not_before(&mut self, id: ReservationId, not_before: Timestamp) -> bool {
        match self.entries.get_mut(id) {
            Some(reservation) => {
                reservation.not_before = reservation.not_before.max(not_before);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let reservation = self.entries.remove(id)?;
        self.unindex(reservation.activity_id, id);
        Some(reservation)
    }

    pub fn remove_order(&mut self, order_id: OrderId) -> usize {
        self.remove_where(|reservation| reservation.order_id == order_id).len()
    }

    pub fn remove_activity(&mut self, activity_id: ActivityId, order_id: OrderId) -> usize {
        self.remove_where(|reservation| reservation.activity_id == activity_id && reservation.order_id == order_id).len()
    }

    /// Removes every reservation with `expires_at < now` and returns them.
    pub fn expire(&mut self, now: Timestamp) -> Vec<(ReservationId, Reservation)> {
        self.remove_where(|reservation| reservation.is_expired(now))
    }

    fn remove_where<F>(&mut self, matches: F) -> Vec<(ReservationId, Reservation)>
    where
        F: Fn(&Reservation) -> bool,
    {
        let ids: Vec<ReservationId> = self.entries.iter().filter(|(_, reservation)| matches(reservation)).map(|(id, _)| id).collect();
        ids.into_iter().filter_map(|id| self.remove(id).map(|reservation| (id, reservation))).collect()
    }

    fn unindex(&mut self, activity_id: ActivityId, id: ReservationId) {
        if let Some(ids) = self.by_activity.get_mut(&activity_id) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                self.by_activity.remove(&activity_id);
            }
        }
    }
}

/// Member of a pending group as reported by the status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMemberStatus {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub expires_in_s: i64,
}

/// Observability view of one activity group waiting for enough quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGroupStatus {
    pub category: EquipmentCategory,
    pub activity_id: ActivityId,
    pub total_quantity: i64,

    /// Quantity the group must reach before it can be promoted. `None` when no unit can hold the total.
    pub threshold: Option<i64>,

    pub members: Vec<PendingMemberStatus>,
}

/// A reservation whose share was committed on a unit together with the rest of its group.
///
/// The reservation stays in the book until the promotion is settled, so a pass can still revert it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedReservation {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub activity_id: ActivityId,
    pub quantity: i64,
    pub equipment_id: EquipmentId,
    pub start: Timestamp,
    pub end: Timestamp,

    /// Staff and units of other categories committed for this member on the same window.
    pub companions: Vec<AllocatedUnit>,
}

/// Result of one confirmation attempt for an activity group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub confirmed: Vec<PromotedReservation>,

    /// True while the activity still has reservations that were not promoted.
    pub still_waiting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(order: u64, activity: u64, quantity: i64, expires_at: Timestamp) -> Reservation {
        Reservation {
            order_id: OrderId::new(order),
            activity_id: ActivityId::new(activity),
            quantity,
            created_at: 0,
            expires_at,
            not_before: 0,
            not_after: 1_000,
        }
    }

    #[test]
    fn groups_keep_arrival_order() {
        let mut book = ReservationBook::new();
        let first = book.insert(reservation(2, 10, 2000, 600));
        let second = book.insert(reservation(1, 10, 1500, 600));
        book.insert(reservation(3, 11, 900, 600));

        let ids: Vec<_> = book.group(ActivityId::new(10)).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(book.activities(), vec![ActivityId::new(10), ActivityId::new(11)]);
    }

    #[test]
    fn expiry_is_strictly_after_the_deadline() {
        let mut book = ReservationBook::new();
        book.insert(reservation(1, 10, 1200, 60));

        assert!(book.expire(60).is_empty());
        assert_eq!(book.expire(61).len(), 1);
        assert!(book.is_empty());
        assert!(book.activities().is_empty());
    }

    #[test]
    fn removing_an_order_is_idempotent() {
        let mut book = ReservationBook::new();
        book.insert(reservation(1, 10, 1200, 60));
        book.insert(reservation(1, 11, 1200, 60));
        book.insert(reservation(2, 10, 1200, 60));

        assert_eq!(book.remove_order(OrderId::new(1)), 2);
        assert_eq!(book.remove_order(OrderId::new(1)), 0);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn not_before_only_moves_forward() {
        let mut book = ReservationBook::new();
        let id = book.insert(reservation(1, 10, 1200, 60));

        book.tighten_not_before(id, 300);
        book.tighten_not_before(id, 100);
        assert_eq!(book.get(id).map(|r| r.not_before), Some(300));
    }
}
