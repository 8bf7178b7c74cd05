use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::domain::manager::reservation_book::{PromotedReservation, ReservationId};
use crate::domain::manager::resource_manager::AllocatedUnit;
use crate::domain::order::order::Order;
use crate::domain::order::status::OrderStatus;
use crate::domain::orchestrator::order_orchestrator::{FailureReport, OrderPlan, Phase1Outcome, PromotedPlacement, ReservedSlot};
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::system::ProductionSystem;
use crate::domain::utils::id::{ActivityId, OrderId};
use crate::domain::utils::statistics::ANALYTICS_TARGET;
use crate::error::{Error, Result};

/// Everything the controller knows about one order.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: Order,
    pub plan: Option<OrderPlan>,
    pub failure: Option<FailureReport>,

    /// Execution passes that ended with the order still below its grouping threshold.
    pub waiting_passes: u32,
}

/// Orders grouped by what the last execution pass did with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub confirmed: Vec<OrderId>,
    pub cancelled: Vec<OrderId>,
    pub waiting: Vec<OrderId>,
}

enum PassDecision {
    Confirm,
    Wait,
    Cancel(FailureReport),
}

/// Sole owner of order statuses. Allocation code returns outcomes; only this controller turns them
/// into status changes, validated against the order state machine.
#[derive(Debug, Default)]
pub struct StatusController {
    records: BTreeMap<OrderId, OrderRecord>,
    max_waiting_passes: u32,
}

impl StatusController {
    pub fn new(max_waiting_passes: u32) -> Self {
        Self { records: BTreeMap::new(), max_waiting_passes }
    }

    pub fn register(&mut self, order: Order) -> Result<()> {
        if self.records.contains_key(&order.id) {
            return Err(Error::ModelConstructionError(format!("order {} submitted twice", order.id)));
        }

        log::debug!("Order {} registered: {} x {}.", order.id, order.quantity, order.product);
        self.records.insert(order.id, OrderRecord { order, plan: None, failure: None, waiting_passes: 0 });
        Ok(())
    }

    pub fn record(&self, id: OrderId) -> Option<&OrderRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &OrderRecord> {
        self.records.values()
    }

    pub fn status(&self, id: OrderId) -> Result<OrderStatus> {
        self.records.get(&id).map(|record| record.order.status()).ok_or(Error::UnknownOrder(id))
    }

    /// Ids of the orders currently in a status matching `filter`, ascending.
    pub fn ids_where<F>(&self, filter: F) -> Vec<OrderId>
    where
        F: Fn(OrderStatus) -> bool,
    {
        self.records.values().filter(|record| filter(record.order.status())).map(|record| record.order.id).collect()
    }

    /// Human-readable failure chain of an order that ended in a failure or error state.
    pub fn failure_chain(&self, id: OrderId) -> Option<String> {
        self.records.get(&id).and_then(|record| record.failure.as_ref()).map(FailureReport::to_string)
    }

    pub fn transition(&mut self, id: OrderId, to: OrderStatus, reason: &str) -> Result<()> {
        let record = self.records.get_mut(&id).ok_or(Error::UnknownOrder(id))?;
        let from = record.order.status();

        if !from.can_transition_to(to) {
            log::error!("Order {}: refused transition {} -> {} ({}).", id, from, to, reason);
            return Err(Error::InvalidTransition { order_id: id, from, to });
        }

        record.order.record_status(to, reason);
        log::info!("Order {}: {} -> {} ({}).", id, from, to, reason);
        tracing::info!(target: ANALYTICS_TARGET, order = %id, from = from.code(), to = to.code(), "status changed");
        Ok(())
    }

    /// Moves a failed order back to pending with a new deadline.
    pub fn retry(&mut self, id: OrderId, deadline: Option<i64>) -> Result<()> {
        self.transition(id, OrderStatus::Pending, "retry requested")?;
        if let Some(record) = self.records.get_mut(&id) {
            record.failure = None;
            record.waiting_passes = 0;
            if let Some(deadline) = deadline {
                record.order.deadline = deadline;
            }
        }
        Ok(())
    }

    /// Applies the allocation phase outcome of one order.
    ///
    /// An order cancelled while its allocation was running keeps its terminal status and
    /// anything the allocation committed in the meantime is released.
    pub fn apply_phase1(&mut self, id: OrderId, outcome: Phase1Outcome, system: &ProductionSystem) -> Result<OrderStatus> {
        let current = self.status(id)?;
        if current.is_terminal() {
            system.release_by_order(id);
            return Ok(current);
        }

        let (status, reason) = match &outcome {
            Phase1Outcome::Allocated(_) => (OrderStatus::Allocated, "all activities committed".to_string()),
            Phase1Outcome::Restricted(_) => (OrderStatus::CapacityRestricted, "reservations below the batch minimum".to_string()),
            Phase1Outcome::Failed(report) => (OrderStatus::AllocationFailed, report.to_string()),
            Phase1Outcome::Invalid(report) => (OrderStatus::Error, report.to_string()),
            Phase1Outcome::Cancelled => (OrderStatus::Cancelled, "cancelled during allocation".to_string()),
        };

        self.transition(id, status, &reason)?;

        if let Some(record) = self.records.get_mut(&id) {
            match outcome {
                Phase1Outcome::Allocated(plan) | Phase1Outcome::Restricted(plan) => record.plan = Some(plan),
                Phase1Outcome::Failed(report) | Phase1Outcome::Invalid(report) => record.failure = Some(report),
                Phase1Outcome::Cancelled => {}
            }
        }

        Ok(status)
    }

    /// Execution pass over every order waiting for its reservations.
    ///
    /// Expired reservations are swept first and an order that lost one is cancelled before any group
    /// forms. Groups are then promoted tentatively. A promotion only becomes final when every member
    /// order has all of its reservations promoted in this pass; otherwise the incomplete orders are left
    /// out and the groups are formed again, so a waiting order never holds a share of a running batch.
    /// An order that has waited `max_waiting_passes` passes is cancelled and released.
    pub fn run_execution_pass(&mut self, system: &ProductionSystem) -> ExecutionReport {
        let now = system.now();
        system.expire_sweep(now);

        let mut report = ExecutionReport::default();
        let mut candidates: BTreeSet<OrderId> = BTreeSet::new();

        for id in self.ids_where(|status| status.awaits_confirmation()) {
            match self.lost_reservation(id, system) {
                Some(failure) => self.cancel_for_capacity(id, failure, system, &mut report),
                None => {
                    candidates.insert(id);
                }
            }
        }

        let promoted = self.promote_complete_orders(system, candidates.clone());

        for id in candidates {
            let applied = match self.decide(id, system, &promoted) {
                PassDecision::Confirm => {
                    report.confirmed.push(id);
                    self.transition(id, OrderStatus::InExecution, "all reservations promoted")
                }
                PassDecision::Wait => {
                    report.waiting.push(id);
                    self.transition(id, OrderStatus::AwaitingGrouping, "group still below the batch minimum")
                }
                PassDecision::Cancel(failure) => {
                    self.cancel_for_capacity(id, failure, system, &mut report);
                    Ok(())
                }
            };

            if let Err(e) = applied {
                log::error!("Execution pass could not update order {}: {}", id, e);
            }
        }

        log::info!(
            "Execution pass: {} confirmed, {} waiting, {} cancelled.",
            report.confirmed.len(),
            report.waiting.len(),
            report.cancelled.len()
        );
        report
    }

    /// Reservations of the order that are not promoted yet.
    fn unpromoted(&self, id: OrderId) -> Vec<(ActivityId, ReservedSlot)> {
        self.records
            .get(&id)
            .and_then(|record| record.plan.as_ref())
            .map(|plan| plan.reservations().filter(|(_, slot)| !slot.is_promoted()).map(|(activity_id, slot)| (activity_id, *slot)).collect())
            .unwrap_or_default()
    }

    fn capacity_failure(id: OrderId, activity_id: ActivityId, category: EquipmentCategory, message: String, system: &ProductionSystem) -> FailureReport {
        FailureReport {
            order_id: id,
            activity_id: Some(activity_id),
            activity_name: system.activity(activity_id).ok().map(|activity| activity.name.clone()),
            category: Some(category.to_string()),
            message,
        }
    }

    /// First reservation of the order that is no longer in its manager's book.
    fn lost_reservation(&self, id: OrderId, system: &ProductionSystem) -> Option<FailureReport> {
        self.unpromoted(id)
            .into_iter()
            .find(|(_, slot)| !system.manager(slot.category).is_ok_and(|manager| manager.is_pending(slot.reservation_id)))
            .map(|(activity_id, slot)| {
                let message = Error::ReservationExpired { order_id: id, activity_id }.to_string();
                Self::capacity_failure(id, activity_id, slot.category, message, system)
            })
    }

    fn cancel_for_capacity(&mut self, id: OrderId, failure: FailureReport, system: &ProductionSystem, report: &mut ExecutionReport) {
        report.cancelled.push(id);
        system.release_by_order(id);

        let reason = failure.to_string();
        if let Some(record) = self.records.get_mut(&id) {
            record.failure = Some(failure);
        }
        if let Err(e) = self.transition(id, OrderStatus::CapacityCancelled, &reason) {
            log::error!("Execution pass could not cancel order {}: {}", id, e);
        }
    }

    /// Promotes the groups of `candidates` until every promoted member order is complete, then settles.
    ///
    /// Each round either settles or drops at least one order from the candidates.
    fn promote_complete_orders(&self, system: &ProductionSystem, mut candidates: BTreeSet<OrderId>) -> HashMap<ReservationId, PromotedReservation> {
        loop {
            let groups: BTreeSet<(EquipmentCategory, ActivityId)> =
                candidates.iter().flat_map(|id| self.unpromoted(*id)).map(|(activity_id, slot)| (slot.category, activity_id)).collect();

            let mut tentative: Vec<(EquipmentCategory, ActivityId, Vec<PromotedReservation>)> = Vec::new();
            for (category, activity_id) in groups {
                let eligible = |order_id: OrderId| candidates.contains(&order_id);
                let outcome = system.manager(category).and_then(|manager| {
                    let activity = system.activity(activity_id)?;
                    let companions = system.companions(activity, category)?;
                    manager.try_confirm(activity, &eligible, &companions)
                });

                match outcome {
                    Ok(outcome) if !outcome.confirmed.is_empty() => tentative.push((category, activity_id, outcome.confirmed)),
                    Ok(_) => {}
                    Err(e) => log::error!("Confirmation of activity {} on {} failed: {}", activity_id, category, e),
                }
            }

            let placed: HashSet<ReservationId> = tentative.iter().flat_map(|(_, _, members)| members.iter().map(|member| member.reservation_id)).collect();
            let incomplete: BTreeSet<OrderId> = candidates
                .iter()
                .copied()
                .filter(|id| self.unpromoted(*id).iter().any(|(_, slot)| !placed.contains(&slot.reservation_id)))
                .collect();
            let blocked = tentative.iter().any(|(_, _, members)| members.iter().any(|member| incomplete.contains(&member.order_id)));

            if !blocked {
                for (category, _, members) in &tentative {
                    if let Ok(manager) = system.manager(*category) {
                        manager.settle(members);
                    }
                }
                return tentative.into_iter().flat_map(|(_, _, members)| members).map(|member| (member.reservation_id, member)).collect();
            }

            for (category, activity_id, members) in &tentative {
                let reverted = system.manager(*category).and_then(|manager| {
                    let activity = system.activity(*activity_id)?;
                    manager.revert(members, &system.companions(activity, *category)?);
                    Ok(())
                });
                if let Err(e) = reverted {
                    log::error!("Could not revert the group of activity {} on {}: {}", activity_id, category, e);
                }
            }

            log::debug!("Orders {:?} cannot complete in this pass; their groups are formed again without them.", incomplete);
            candidates.retain(|id| !incomplete.contains(id));
        }
    }

    /// Records promotions on the order's plan and decides what happens to it in this pass.
    fn decide(&mut self, id: OrderId, system: &ProductionSystem, promoted: &HashMap<ReservationId, PromotedReservation>) -> PassDecision {
        let max_waiting_passes = self.max_waiting_passes;
        let Some(record) = self.records.get_mut(&id) else {
            return PassDecision::Wait;
        };
        let Some(plan) = record.plan.as_mut() else {
            return PassDecision::Wait;
        };

        for activity in plan.activities.iter_mut() {
            for slot in activity.reservations.iter_mut().filter(|slot| !slot.is_promoted()) {
                if let Some(p) = promoted.get(&slot.reservation_id) {
                    slot.placement = Some(PromotedPlacement { equipment_id: p.equipment_id, start: p.start, end: p.end });
                    activity.start = p.start;
                    activity.end = p.end;
                    activity.units.push(AllocatedUnit::Equipment(p.equipment_id));
                    activity.units.extend(p.companions.iter().copied());
                }
            }
        }

        let Some((activity_id, category)) =
            plan.reservations().find(|(_, slot)| !slot.is_promoted()).map(|(activity_id, slot)| (activity_id, slot.category))
        else {
            return PassDecision::Confirm;
        };

        record.waiting_passes += 1;
        if max_waiting_passes > 0 && record.waiting_passes >= max_waiting_passes {
            let message = format!("still below the batch minimum after {} execution passes", record.waiting_passes);
            return PassDecision::Cancel(Self::capacity_failure(id, activity_id, category, message, system));
        }

        PassDecision::Wait
    }
}
