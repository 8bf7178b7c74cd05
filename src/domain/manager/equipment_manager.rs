use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::activity::activity::Activity;
use crate::domain::manager::reservation_book::{
    ConfirmOutcome, PendingGroupStatus, PendingMemberStatus, PromotedReservation, Reservation, ReservationBook, ReservationId,
};
use crate::domain::manager::resource_manager::{
    AllocatedUnit, Allocation, AllocationRequest, CompanionPlacer, ResourceManager, backward_windows,
};
use crate::domain::resource::category::{CategoryConfig, EquipmentCategory, SupportsBatching};
use crate::domain::resource::equipment::{Occupation, OccupationShare};
use crate::domain::resource::equipment_store::{EquipmentKey, EquipmentStore};
use crate::domain::simulator::simulator::SystemSimulator;
use crate::domain::utils::id::{ActivityId, EquipmentId, OrderId, Timestamp, hhmm};
use crate::domain::utils::statistics::{StatParameter, StatisticEvent, add_global_event};
use crate::error::{Error, Result};

/// Static facts about a unit captured when a search starts. Capacities never change during a run.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: EquipmentKey,
    id: EquipmentId,
    fip: i64,
    capacity_min: i64,
    capacity_max: i64,
    reservation_timeout_s: Option<i64>,
}

impl Candidate {
    fn accepts(&self, quantity: i64) -> bool {
        quantity > 0 && quantity >= self.capacity_min && quantity <= self.capacity_max
    }
}

/// Manager of all interchangeable units of one equipment category.
///
/// Runs the backward-scheduling search for direct allocations and, when the category supports
/// batching, keeps the reservations of quantities below the unit minimum until their activity
/// group is large enough to be promoted into a single occupation.
#[derive(Debug)]
pub struct EquipmentManager {
    config: CategoryConfig,
    store: EquipmentStore,

    /// Arena keys of the category's units, ordered by equipment id.
    units: Vec<EquipmentKey>,

    granularity_s: i64,
    simulator: Arc<dyn SystemSimulator>,

    /// Critical section of the category: every check-and-commit on its units and every
    /// reservation change happens while this lock is held.
    section: Mutex<ReservationBook>,
}

impl EquipmentManager {
    pub fn new(config: CategoryConfig, store: EquipmentStore, granularity_s: i64, simulator: Arc<dyn SystemSimulator>) -> Self {
        let units = store.keys_of_category(config.category);
        log::debug!("Manager for {} created with {} units (batching: {}).", config.category, units.len(), config.batching.is_enabled());

        Self { config, store, units, granularity_s, simulator, section: Mutex::new(ReservationBook::new()) }
    }

    pub fn category(&self) -> EquipmentCategory {
        self.config.category
    }

    pub fn supports_batching(&self) -> bool {
        self.config.batching.is_enabled()
    }

    pub fn unit_keys(&self) -> &[EquipmentKey] {
        &self.units
    }

    fn lock(&self) -> MutexGuard<'_, ReservationBook> {
        self.section.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Timestamp {
        self.simulator.get_current_time_in_s()
    }

    fn units_required(&self, activity: &Activity) -> usize {
        activity.units_required(self.config.category).max(1) as usize
    }

    fn default_reservation_timeout(&self) -> i64 {
        match self.config.batching {
            SupportsBatching::Yes { reservation_timeout_s } => reservation_timeout_s,
            SupportsBatching::No => 0,
        }
    }

    /// Units of the category that are eligible for the activity and satisfy its technical requirement,
    /// ordered by (priority weight, id).
    fn candidates(&self, activity: &Activity) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .units
            .iter()
            .filter_map(|key| {
                self.store
                    .with_equipment(*key, |unit| {
                        let eligible = activity.is_eligible(unit.id) && activity.requirement_for(unit.id).is_satisfied_by(&unit.profile);
                        eligible.then(|| Candidate {
                            key: *key,
                            id: unit.id,
                            fip: activity.fip_for(unit.id, unit.fip),
                            capacity_min: unit.capacity_min,
                            capacity_max: unit.capacity_max,
                            reservation_timeout_s: unit.reservation_timeout_s,
                        })
                    })
                    .flatten()
            })
            .collect();

        candidates.sort_by_key(|candidate| (candidate.fip, candidate.id));
        candidates
    }

    /// Commits a copy of `template` on the first `count` candidates able to host it.
    /// Either all `count` units are committed or nothing is. Caller holds the section lock.
    fn commit_window(&self, candidates: &[Candidate], count: usize, template: &Occupation) -> Option<Vec<EquipmentId>> {
        let mut placed: Vec<(EquipmentKey, EquipmentId)> = Vec::with_capacity(count);

        for candidate in candidates {
            if placed.len() == count {
                break;
            }

            let committed = self.store.with_mut_equipment(candidate.key, |unit| {
                unit.can_host(template.quantity(), template.start, template.end) && unit.occupy(template.clone())
            });

            if committed == Some(true) {
                placed.push((candidate.key, candidate.id));
            }
        }

        if placed.len() == count {
            return Some(placed.into_iter().map(|(_, id)| id).collect());
        }

        for (key, _) in placed {
            self.store.with_mut_equipment(key, |unit| {
                for share in &template.shares {
                    unit.release_window(template.activity_id, share.order_id, template.start, template.end);
                }
            });
        }

        None
    }

    fn failure(&self, request: &AllocationRequest) -> Error {
        Error::AllocationFailed {
            activity_id: request.activity.id,
            category: self.label(),
            quantity: request.quantity,
            not_after: request.not_after,
        }
    }

    fn event(&self, command: &str) -> StatisticEvent {
        let mut event = StatisticEvent::new(command);
        event.set(StatParameter::Time, self.now()).set(StatParameter::Component, self.label());
        event
    }

    /// Occupation of a direct allocation on one unit of a (possibly multi-unit) placement.
    fn direct_occupation(request: &AllocationRequest, per_unit: i64, start: Timestamp, end: Timestamp) -> Occupation {
        Occupation::single(request.order_id, request.activity.id, per_unit, start, end)
    }

    /// Quantity each unit carries when the activity occupies `count` units together.
    fn split_quantity(quantity: i64, count: usize) -> i64 {
        let count = count.max(1) as i64;
        (quantity + count - 1) / count
    }

    /// True when the quantity must go through the reservation path: the category batches,
    /// some eligible unit can hold the quantity, but none accepts it because it lies below every minimum.
    pub fn needs_reservation(&self, activity: &Activity, quantity: i64) -> bool {
        if !self.supports_batching() || self.units_required(activity) > 1 {
            return false;
        }

        let holders: Vec<Candidate> = self.candidates(activity).into_iter().filter(|c| c.capacity_max >= quantity).collect();
        !holders.is_empty() && !holders.iter().any(|c| c.accepts(quantity))
    }

    /// Drops expired reservations. Caller holds the section lock.
    fn sweep(&self, book: &mut ReservationBook, now: Timestamp) -> usize {
        let expired = book.expire(now);

        for (_, reservation) in &expired {
            log::info!("{}", Error::ReservationExpired { order_id: reservation.order_id, activity_id: reservation.activity_id });

            let mut event = self.event("Expire");
            event
                .set(StatParameter::Order, reservation.order_id.value())
                .set(StatParameter::Activity, reservation.activity_id.value())
                .set(StatParameter::Quantity, reservation.quantity)
                .set(StatParameter::Outcome, "expired");
            add_global_event(event);
        }

        expired.len()
    }

    /// Removes reservations whose lifetime ended before `now`.
    pub fn expire_sweep(&self, now: Timestamp) -> usize {
        let mut book = self.lock();
        self.sweep(&mut book, now)
    }

    /// Records a provisional claim that ignores the unit minimum.
    ///
    /// Succeeds whenever some eligible unit can hold the quantity. The reservation lives for the
    /// shortest timeout among those units.
    pub fn reserve(&self, activity: &Activity, order_id: OrderId, quantity: i64, not_before: Timestamp, not_after: Timestamp) -> Result<ReservationId> {
        let now = self.now();
        let mut book = self.lock();
        self.sweep(&mut book, now);

        let timeout = self
            .candidates(activity)
            .into_iter()
            .filter(|candidate| candidate.capacity_max >= quantity)
            .map(|candidate| candidate.reservation_timeout_s.unwrap_or_else(|| self.default_reservation_timeout()))
            .min();

        let Some(timeout) = timeout.filter(|_| self.supports_batching()) else {
            log::warn!("No {} unit can hold {} units of activity {} for order {}.", self.config.category, quantity, activity.id, order_id);
            return Err(Error::AllocationFailed { activity_id: activity.id, category: self.label(), quantity, not_after });
        };

        let reservation = Reservation { order_id, activity_id: activity.id, quantity, created_at: now, expires_at: now + timeout, not_before, not_after };
        let id = book.insert(reservation);

        log::info!(
            "Order {} reserved {} units on {} for activity {} ({}), expires in {}s.",
            order_id,
            quantity,
            self.config.category,
            activity.id,
            activity.name,
            timeout
        );

        let mut event = self.event("Reserve");
        event
            .set(StatParameter::Order, order_id.value())
            .set(StatParameter::Activity, activity.id.value())
            .set(StatParameter::Quantity, quantity)
            .set(StatParameter::End, not_after)
            .set(StatParameter::Outcome, "waiting");
        add_global_event(event);

        Ok(id)
    }

    /// Lowest minimum among the eligible units able to hold `total`.
    fn threshold(candidates: &[Candidate], total: i64) -> Option<i64> {
        candidates.iter().filter(|candidate| candidate.capacity_max >= total).map(|candidate| candidate.capacity_min).min()
    }

    /// Tries to promote the pending reservations of an activity into one occupation.
    ///
    /// Only reservations of orders accepted by `eligible` take part. Members are taken in arrival order
    /// while their running total fits the largest eligible unit. When that total reaches the threshold
    /// the group is placed backward within the tightest bounds of its members, on a single unit, with
    /// the duration of the combined quantity, and `companions` commits each member's other resources
    /// on the same window. A window where some member's companions do not fit is undone and the search
    /// moves on.
    ///
    /// The promotion is tentative: the reservations stay in the book until [`Self::settle`] removes
    /// them, and [`Self::revert`] gives the window back.
    pub fn try_confirm(&self, activity: &Activity, eligible: &dyn Fn(OrderId) -> bool, companions: &dyn CompanionPlacer) -> Result<ConfirmOutcome> {
        let now = self.now();
        let mut book = self.lock();
        self.sweep(&mut book, now);

        let group: Vec<(ReservationId, Reservation)> =
            book.group(activity.id).into_iter().filter(|(_, r)| eligible(r.order_id)).map(|(id, r)| (id, r.clone())).collect();
        if group.is_empty() {
            return Ok(ConfirmOutcome { confirmed: Vec::new(), still_waiting: !book.group(activity.id).is_empty() });
        }

        let candidates = self.candidates(activity);
        let largest = candidates.iter().map(|candidate| candidate.capacity_max).max().unwrap_or(0);

        let mut members: Vec<(ReservationId, Reservation)> = Vec::new();
        let mut total = 0;
        for (id, reservation) in group {
            if total + reservation.quantity <= largest {
                total += reservation.quantity;
                members.push((id, reservation));
            }
        }

        let threshold = Self::threshold(&candidates, total);
        if members.is_empty() || threshold.is_none_or(|threshold| total < threshold) {
            log::debug!("Activity {} on {} has {} units reserved, below threshold {:?}.", activity.id, self.config.category, total, threshold);
            return Ok(ConfirmOutcome { confirmed: Vec::new(), still_waiting: true });
        }

        let duration = activity.duration_for(total)?;
        let not_after = members.iter().map(|(_, r)| r.not_after).min().unwrap_or(now);
        let not_before = members.iter().map(|(_, r)| r.not_before).max().unwrap_or(now);
        let shares: Vec<OccupationShare> = members.iter().map(|(_, r)| OccupationShare { order_id: r.order_id, quantity: r.quantity }).collect();
        let holders: Vec<Candidate> = candidates.into_iter().filter(|candidate| candidate.accepts(total)).collect();

        for (start, end) in backward_windows(not_before, not_after, duration, self.granularity_s) {
            let occupation = Occupation { activity_id: activity.id, start, end, shares: shares.clone() };

            let Some(units) = self.commit_window(&holders, 1, &occupation) else {
                continue;
            };
            let Some(equipment_id) = units.first().copied() else {
                continue;
            };

            let mut confirmed: Vec<PromotedReservation> = Vec::with_capacity(members.len());
            for (id, r) in &members {
                let Some(placed) = companions.place(r.order_id, r.quantity, start, end) else {
                    log::debug!("Order {} cannot get the companions of activity {} from {} to {}.", r.order_id, activity.id, hhmm(start), hhmm(end));
                    break;
                };
                confirmed.push(PromotedReservation {
                    reservation_id: *id,
                    order_id: r.order_id,
                    activity_id: activity.id,
                    quantity: r.quantity,
                    equipment_id,
                    start,
                    end,
                    companions: placed,
                });
            }

            if confirmed.len() < members.len() {
                for member in &confirmed {
                    companions.release(member.order_id);
                }
                self.release_occupation(equipment_id, &occupation);
                continue;
            }

            log::debug!("Group of activity {} ({} units) placed on {} from {} to {}.", activity.id, total, equipment_id, hhmm(start), hhmm(end));

            let still_waiting = book.group(activity.id).len() > confirmed.len();
            return Ok(ConfirmOutcome { confirmed, still_waiting });
        }

        log::warn!(
            "Group of activity {} ({} units) reached its threshold but no {} unit is free before {}; it stays pending.",
            activity.id,
            total,
            self.config.category,
            hhmm(not_after)
        );
        Ok(ConfirmOutcome { confirmed: Vec::new(), still_waiting: true })
    }

    /// Makes a tentative promotion final: the members leave the reservation book.
    pub fn settle(&self, promoted: &[PromotedReservation]) {
        let Some(first) = promoted.first() else {
            return;
        };

        let mut book = self.lock();
        for member in promoted {
            book.remove(member.reservation_id);
        }

        let total: i64 = promoted.iter().map(|member| member.quantity).sum();
        log::info!(
            "Promoted {} reservations of activity {} ({} units) on {} from {} to {}.",
            promoted.len(),
            first.activity_id,
            total,
            first.equipment_id,
            hhmm(first.start),
            hhmm(first.end)
        );

        let mut event = self.event("Confirm");
        event
            .set(StatParameter::Unit, first.equipment_id.value())
            .set(StatParameter::Activity, first.activity_id.value())
            .set(StatParameter::Quantity, total)
            .set(StatParameter::Start, first.start)
            .set(StatParameter::End, first.end)
            .set(StatParameter::Outcome, promoted.len());
        add_global_event(event);
    }

    /// Undoes a tentative promotion. The members stay pending in the book.
    pub fn revert(&self, promoted: &[PromotedReservation], companions: &dyn CompanionPlacer) {
        let _section = self.lock();

        for member in promoted {
            companions.release(member.order_id);
            if let Some(key) = self.store.key_of(member.equipment_id) {
                self.store.with_mut_equipment(key, |unit| unit.release_window(member.activity_id, member.order_id, member.start, member.end));
            }
        }

        if let Some(first) = promoted.first() {
            log::debug!("Reverted the tentative group of activity {} on {}.", first.activity_id, first.equipment_id);
        }
    }

    /// Gives back every share of an occupation committed by this manager. Caller holds the section lock.
    fn release_occupation(&self, equipment_id: EquipmentId, occupation: &Occupation) {
        let Some(key) = self.store.key_of(equipment_id) else {
            return;
        };
        self.store.with_mut_equipment(key, |unit| {
            for share in &occupation.shares {
                unit.release_window(occupation.activity_id, share.order_id, occupation.start, occupation.end);
            }
        });
    }

    pub fn is_pending(&self, id: ReservationId) -> bool {
        self.lock().contains(id)
    }

    /// Raises the earliest start a reservation's promoted occupation may take.
    pub fn tighten_reservation(&self, id: ReservationId, not_before: Timestamp) -> bool {
        self.lock().tighten_not_before(id, not_before)
    }

    /// Pending groups with their totals, thresholds and the time left to each member.
    pub fn pending_groups(&self, activities: &HashMap<ActivityId, Arc<Activity>>) -> Vec<PendingGroupStatus> {
        let now = self.now();
        let mut book = self.lock();
        self.sweep(&mut book, now);

        book.activities()
            .into_iter()
            .map(|activity_id| {
                let members: Vec<PendingMemberStatus> = book
                    .group(activity_id)
                    .into_iter()
                    .map(|(id, r)| PendingMemberStatus { reservation_id: id, order_id: r.order_id, quantity: r.quantity, expires_in_s: r.expires_at - now })
                    .collect();
                let total_quantity = members.iter().map(|member| member.quantity).sum();
                let threshold =
                    activities.get(&activity_id).and_then(|activity| Self::threshold(&self.candidates(activity), total_quantity));

                PendingGroupStatus { category: self.config.category, activity_id, total_quantity, threshold, members }
            })
            .collect()
    }

    fn record_release(&self, order_id: OrderId, activity_id: Option<ActivityId>, released: usize) {
        let mut event = self.event("Release");
        event.set(StatParameter::Order, order_id.value()).set(StatParameter::Outcome, released);
        if let Some(activity_id) = activity_id {
            event.set(StatParameter::Activity, activity_id.value());
        }
        add_global_event(event);
    }
}

impl ResourceManager for EquipmentManager {
    fn label(&self) -> String {
        self.config.category.to_string()
    }

    fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
        let activity = request.activity;
        let duration = activity.duration_for(request.quantity)?;
        let count = self.units_required(activity);
        let per_unit = Self::split_quantity(request.quantity, count);

        let candidates: Vec<Candidate> = self.candidates(activity).into_iter().filter(|candidate| candidate.accepts(per_unit)).collect();
        let mut attempts: usize = 0;

        if candidates.len() >= count {
            for (start, end) in backward_windows(request.not_before, request.not_after, duration, self.granularity_s) {
                attempts += 1;

                let _section = self.lock();
                let template = Self::direct_occupation(request, per_unit, start, end);
                let Some(units) = self.commit_window(&candidates, count, &template) else {
                    continue;
                };

                log::info!(
                    "Order {} activity {} ({}) allocated on {:?} from {} to {} after {} attempts.",
                    request.order_id,
                    activity.id,
                    activity.name,
                    units,
                    hhmm(start),
                    hhmm(end),
                    attempts
                );

                let mut event = self.event("Allocate");
                event
                    .set(StatParameter::Unit, units.iter().map(|id| id.value().to_string()).collect::<Vec<_>>().join(","))
                    .set(StatParameter::Order, request.order_id.value())
                    .set(StatParameter::Activity, activity.id.value())
                    .set(StatParameter::Quantity, request.quantity)
                    .set(StatParameter::Start, start)
                    .set(StatParameter::End, end)
                    .set(StatParameter::Attempts, attempts)
                    .set(StatParameter::Outcome, "ok");
                add_global_event(event);

                return Ok(Allocation { activity_id: activity.id, units: units.into_iter().map(AllocatedUnit::Equipment).collect(), start, end });
            }
        } else {
            log::debug!(
                "Only {} of {} required {} units accept {} units for activity {}.",
                candidates.len(),
                count,
                self.config.category,
                per_unit,
                activity.id
            );
        }

        log::warn!(
            "Order {} activity {}: no {} unit free for {} units between {} and {}.",
            request.order_id,
            activity.id,
            self.config.category,
            request.quantity,
            hhmm(request.not_before),
            hhmm(request.not_after)
        );

        let mut event = self.event("Allocate");
        event
            .set(StatParameter::Order, request.order_id.value())
            .set(StatParameter::Activity, activity.id.value())
            .set(StatParameter::Quantity, request.quantity)
            .set(StatParameter::Attempts, attempts)
            .set(StatParameter::Outcome, "failed");
        add_global_event(event);

        Err(self.failure(request))
    }

    fn place_window(&self, request: &AllocationRequest, start: Timestamp, end: Timestamp) -> Option<Allocation> {
        let count = self.units_required(request.activity);
        let per_unit = Self::split_quantity(request.quantity, count);
        let candidates: Vec<Candidate> = self.candidates(request.activity).into_iter().filter(|candidate| candidate.accepts(per_unit)).collect();

        if candidates.len() < count {
            return None;
        }

        let _section = self.lock();
        let template = Self::direct_occupation(request, per_unit, start, end);
        let units = self.commit_window(&candidates, count, &template)?;

        Some(Allocation { activity_id: request.activity.id, units: units.into_iter().map(AllocatedUnit::Equipment).collect(), start, end })
    }

    fn release_by_order(&self, order_id: OrderId) -> usize {
        let mut book = self.lock();
        let reservations = book.remove_order(order_id);
        let shares: usize = self.units.iter().filter_map(|key| self.store.with_mut_equipment(*key, |unit| unit.release_by_order(order_id))).sum();

        if shares + reservations > 0 {
            log::debug!("Released {} occupations and {} reservations of order {} on {}.", shares, reservations, order_id, self.config.category);
            self.record_release(order_id, None, shares + reservations);
        }
        shares + reservations
    }

    fn release_by_activity(&self, activity_id: ActivityId, order_id: OrderId) -> usize {
        let mut book = self.lock();
        let reservations = book.remove_activity(activity_id, order_id);
        let shares: usize =
            self.units.iter().filter_map(|key| self.store.with_mut_equipment(*key, |unit| unit.release_by_activity(activity_id, order_id))).sum();

        if shares + reservations > 0 {
            self.record_release(order_id, Some(activity_id), shares + reservations);
        }
        shares + reservations
    }

    fn release_finished(&self, now: Timestamp) -> usize {
        let _section = self.lock();
        self.units.iter().filter_map(|key| self.store.with_mut_equipment(*key, |unit| unit.release_finished(now))).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::duration::{DurationBand, DurationTable};
    use crate::domain::resource::equipment::Equipment;
    use crate::domain::resource::technical::TechnicalProfile;
    use crate::domain::manager::resource_manager::NoCompanions;
    use crate::domain::simulator::simulator_mock::MockSimulator;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    const HOUR: i64 = 3_600;

    fn activity(id: u64, eligible: &[u64], count: u32) -> Activity {
        let durations = DurationTable::new(vec![
            DurationBand { quantity_min: 1, quantity_max: 5_000, duration_s: 600 },
            DurationBand { quantity_min: 5_001, quantity_max: 20_000, duration_s: 1_200 },
        ])
        .unwrap();

        Activity {
            id: ActivityId::new(id),
            name: format!("mix {}", id),
            kind: "MISTURA".to_string(),
            equipment_requirements: BTreeMap::from([(EquipmentCategory::Mixers, count)]),
            eligible_equipment: eligible.iter().copied().map(EquipmentId::new).collect(),
            equipment_fips: HashMap::new(),
            configurations: HashMap::new(),
            staff_types: Vec::new(),
            staff_count: 0,
            durations,
            max_wait_s: None,
        }
    }

    fn manager(units: &[(u64, i64)], batching: SupportsBatching, clock: &MockSimulator) -> EquipmentManager {
        let store = EquipmentStore::new();
        for (id, fip) in units {
            store.add(Equipment::new(EquipmentId::new(*id), format!("Masseira {}", id), EquipmentCategory::Mixers, 3_000, 20_000, *fip, TechnicalProfile::Plain));
        }
        let config = CategoryConfig { category: EquipmentCategory::Mixers, batching };
        EquipmentManager::new(config, store, 60, Arc::new(clock.clone()))
    }

    #[test]
    fn allocation_takes_the_latest_window_on_the_preferred_unit() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 5), (2, 1)], SupportsBatching::No, &clock);
        let activity = activity(10, &[1, 2], 1);

        let allocation = manager.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 4_000, 0, 10 * HOUR)).unwrap();
        assert_eq!(allocation.units, vec![AllocatedUnit::Equipment(EquipmentId::new(2))]);
        assert_eq!((allocation.start, allocation.end), (10 * HOUR - 600, 10 * HOUR));
    }

    #[test]
    fn busy_units_push_the_window_backward() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::No, &clock);
        let activity = activity(10, &[1], 1);

        let first = manager.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 4_000, 0, HOUR)).unwrap();
        let second = manager.allocate(&AllocationRequest::new(OrderId::new(2), &activity, 4_000, 0, HOUR)).unwrap();

        assert_eq!(first.start, HOUR - 600);
        assert!(second.end <= first.start);
        assert_eq!(second.end, HOUR - 600);
    }

    #[test]
    fn below_minimum_fails_without_batching() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::No, &clock);
        let activity = activity(10, &[1], 1);

        let result = manager.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 1_200, 0, HOUR));
        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
        assert!(!manager.needs_reservation(&activity, 1_200));
    }

    #[test]
    fn lower_bound_stops_the_search() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::No, &clock);
        let activity = activity(10, &[1], 1);

        let result = manager.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 4_000, HOUR - 300, HOUR));
        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
    }

    #[test]
    fn multi_unit_activities_split_the_quantity() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1), (2, 2), (3, 3)], SupportsBatching::No, &clock);
        let activity = activity(10, &[1, 2, 3], 2);

        let allocation = manager.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 9_000, 0, HOUR)).unwrap();
        assert_eq!(allocation.units.len(), 2);

        let loads: Vec<i64> = manager
            .unit_keys()
            .iter()
            .filter_map(|key| manager.store.with_equipment(*key, |unit| unit.load_within(0, HOUR)))
            .collect();
        assert_eq!(loads, vec![4_500, 4_500, 0]);
    }

    /// Companions free only for windows ending by `until`. Releases are recorded.
    struct FreeUntil {
        until: Timestamp,
        released: RefCell<Vec<OrderId>>,
    }

    impl FreeUntil {
        fn new(until: Timestamp) -> Self {
            Self { until, released: RefCell::new(Vec::new()) }
        }
    }

    impl CompanionPlacer for FreeUntil {
        fn place(&self, _order_id: OrderId, _quantity: i64, _start: Timestamp, end: Timestamp) -> Option<Vec<AllocatedUnit>> {
            (end <= self.until).then(Vec::new)
        }

        fn release(&self, order_id: OrderId) {
            self.released.borrow_mut().push(order_id);
        }
    }

    fn occupations_of(manager: &EquipmentManager) -> Vec<Occupation> {
        manager.store.with_equipment(manager.unit_keys()[0], |unit| unit.occupations().to_vec()).unwrap()
    }

    #[test]
    fn reservations_group_into_one_occupation() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::Yes { reservation_timeout_s: 600 }, &clock);
        let activity = activity(10, &[1], 1);

        assert!(manager.needs_reservation(&activity, 1_500));
        let first = manager.reserve(&activity, OrderId::new(1), 1_500, 0, HOUR).unwrap();
        let outcome = manager.try_confirm(&activity, &|_| true, &NoCompanions).unwrap();
        assert!(outcome.confirmed.is_empty());
        assert!(outcome.still_waiting);

        manager.reserve(&activity, OrderId::new(2), 2_000, 0, HOUR).unwrap();
        let outcome = manager.try_confirm(&activity, &|_| true, &NoCompanions).unwrap();
        assert_eq!(outcome.confirmed.len(), 2);
        assert!(!outcome.still_waiting);
        assert!(manager.is_pending(first));

        manager.settle(&outcome.confirmed);
        assert!(!manager.is_pending(first));

        let occupations = occupations_of(&manager);
        assert_eq!(occupations.len(), 1);
        assert_eq!(occupations[0].quantity(), 3_500);
    }

    #[test]
    fn ineligible_orders_stay_out_of_the_group() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::Yes { reservation_timeout_s: 600 }, &clock);
        let activity = activity(10, &[1], 1);

        manager.reserve(&activity, OrderId::new(1), 1_500, 0, HOUR).unwrap();
        manager.reserve(&activity, OrderId::new(2), 2_000, 0, HOUR).unwrap();

        let outcome = manager.try_confirm(&activity, &|order_id| order_id != OrderId::new(1), &NoCompanions).unwrap();
        assert!(outcome.confirmed.is_empty());
        assert!(outcome.still_waiting);
        assert!(occupations_of(&manager).is_empty());
    }

    #[test]
    fn revert_gives_the_window_back_and_keeps_members_pending() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::Yes { reservation_timeout_s: 600 }, &clock);
        let activity = activity(10, &[1], 1);

        let first = manager.reserve(&activity, OrderId::new(1), 1_500, 0, HOUR).unwrap();
        let second = manager.reserve(&activity, OrderId::new(2), 2_000, 0, HOUR).unwrap();

        let outcome = manager.try_confirm(&activity, &|_| true, &NoCompanions).unwrap();
        assert_eq!(occupations_of(&manager).len(), 1);

        manager.revert(&outcome.confirmed, &NoCompanions);
        assert!(occupations_of(&manager).is_empty());
        assert!(manager.is_pending(first));
        assert!(manager.is_pending(second));
    }

    #[test]
    fn group_moves_back_until_every_member_gets_its_companions() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::Yes { reservation_timeout_s: 600 }, &clock);
        let activity = activity(10, &[1], 1);
        let busy_at_the_end = FreeUntil::new(HOUR - 600);

        manager.reserve(&activity, OrderId::new(1), 1_500, 0, HOUR).unwrap();
        manager.reserve(&activity, OrderId::new(2), 2_000, 0, HOUR).unwrap();

        let outcome = manager.try_confirm(&activity, &|_| true, &busy_at_the_end).unwrap();
        assert_eq!(outcome.confirmed.len(), 2);
        assert!(outcome.confirmed.iter().all(|member| (member.start, member.end) == (HOUR - 1_200, HOUR - 600)));
        assert_eq!(occupations_of(&manager).len(), 1);
        assert!(busy_at_the_end.released.borrow().is_empty());

        manager.revert(&outcome.confirmed, &busy_at_the_end);
        assert_eq!(*busy_at_the_end.released.borrow(), vec![OrderId::new(1), OrderId::new(2)]);

        let never = FreeUntil::new(0);
        let outcome = manager.try_confirm(&activity, &|_| true, &never).unwrap();
        assert!(outcome.confirmed.is_empty());
        assert!(outcome.still_waiting);
        assert!(occupations_of(&manager).is_empty());
    }

    #[test]
    fn expired_reservations_leave_the_group() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::Yes { reservation_timeout_s: 60 }, &clock);
        let activity = activity(10, &[1], 1);
        let activities = HashMap::from([(activity.id, Arc::new(activity.clone()))]);

        let id = manager.reserve(&activity, OrderId::new(1), 1_200, 0, HOUR).unwrap();
        assert_eq!(manager.pending_groups(&activities)[0].total_quantity, 1_200);
        assert_eq!(manager.pending_groups(&activities)[0].threshold, Some(3_000));

        clock.advance(61);
        assert!(manager.pending_groups(&activities).is_empty());
        assert!(!manager.is_pending(id));
    }

    #[test]
    fn release_by_order_drops_reservations_too() {
        let clock = MockSimulator::new(0);
        let manager = manager(&[(1, 1)], SupportsBatching::Yes { reservation_timeout_s: 600 }, &clock);
        let activity = activity(10, &[1], 1);

        manager.reserve(&activity, OrderId::new(1), 1_200, 0, HOUR).unwrap();
        manager.allocate(&AllocationRequest::new(OrderId::new(1), &activity, 4_000, 0, HOUR)).unwrap();

        assert_eq!(manager.release_by_order(OrderId::new(1)), 2);
        assert_eq!(manager.release_by_order(OrderId::new(1)), 0);
    }
}
