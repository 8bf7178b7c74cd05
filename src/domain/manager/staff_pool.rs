use std::sync::{Mutex, PoisonError, RwLock};

use crate::domain::activity::activity::Activity;
use crate::domain::manager::resource_manager::{AllocatedUnit, Allocation, AllocationRequest, ResourceManager, backward_windows};
use crate::domain::resource::staff::{StaffMember, StaffOccupation};
use crate::domain::utils::id::{ActivityId, OrderId, StaffId, Timestamp, hhmm};
use crate::error::{Error, Result};

/// Staff of the production floor, allocated with the same backward search as equipment.
#[derive(Debug)]
pub struct StaffPool {
    /// Ordered by id.
    members: Vec<RwLock<StaffMember>>,
    granularity_s: i64,

    /// Critical section of the pool.
    section: Mutex<()>,
}

impl StaffPool {
    pub fn new(mut members: Vec<StaffMember>, granularity_s: i64) -> Self {
        members.sort_by_key(|member| member.id);
        Self { members: members.into_iter().map(RwLock::new).collect(), granularity_s, section: Mutex::new(()) }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Snapshot of one member, mainly for agendas and tests.
    pub fn member(&self, id: StaffId) -> Option<StaffMember> {
        self.members.iter().map(|member| member.read().unwrap_or_else(PoisonError::into_inner)).find(|member| member.id == id).map(|member| member.clone())
    }

    /// Indices of members whose type the activity accepts, ordered by (priority weight, id).
    fn candidates(&self, activity: &Activity) -> Vec<(usize, StaffId)> {
        let mut candidates: Vec<(i64, StaffId, usize)> = self
            .members
            .iter()
            .enumerate()
            .filter_map(|(index, member)| {
                let member = member.read().unwrap_or_else(PoisonError::into_inner);
                activity.staff_types.contains(&member.staff_type).then_some((member.fip, member.id, index))
            })
            .collect();

        candidates.sort();
        candidates.into_iter().map(|(_, id, index)| (index, id)).collect()
    }

    /// Commits the first `count` free candidates on `[start, end)` or nothing. Caller holds the section.
    fn commit_window(&self, candidates: &[(usize, StaffId)], count: usize, request: &AllocationRequest, start: Timestamp, end: Timestamp) -> Option<Vec<StaffId>> {
        let occupation = StaffOccupation { order_id: request.order_id, activity_id: request.activity.id, start, end };
        let mut placed: Vec<(usize, StaffId)> = Vec::with_capacity(count);

        for (index, id) in candidates {
            if placed.len() == count {
                break;
            }
            let mut member = self.members[*index].write().unwrap_or_else(PoisonError::into_inner);
            if member.occupy(occupation) {
                placed.push((*index, *id));
            }
        }

        if placed.len() == count {
            return Some(placed.into_iter().map(|(_, id)| id).collect());
        }

        for (index, _) in placed {
            let mut member = self.members[index].write().unwrap_or_else(PoisonError::into_inner);
            member.release_where(|held| *held == occupation);
        }
        None
    }

    fn release_where<F>(&self, matches: F) -> usize
    where
        F: Fn(&StaffOccupation) -> bool,
    {
        let _section = self.section.lock().unwrap_or_else(PoisonError::into_inner);
        self.members.iter().map(|member| member.write().unwrap_or_else(PoisonError::into_inner).release_where(&matches)).sum()
    }
}

impl ResourceManager for StaffPool {
    fn label(&self) -> String {
        "staff".to_string()
    }

    fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
        let duration = request.activity.duration_for(request.quantity)?;

        for (start, end) in backward_windows(request.not_before, request.not_after, duration, self.granularity_s) {
            if let Some(allocation) = self.place_window(request, start, end) {
                return Ok(allocation);
            }
        }

        log::warn!(
            "Order {} activity {}: {} staff of types {:?} not available before {}.",
            request.order_id,
            request.activity.id,
            request.activity.staff_count,
            request.activity.staff_types,
            hhmm(request.not_after)
        );

        Err(Error::AllocationFailed {
            activity_id: request.activity.id,
            category: self.label(),
            quantity: request.quantity,
            not_after: request.not_after,
        })
    }

    fn place_window(&self, request: &AllocationRequest, start: Timestamp, end: Timestamp) -> Option<Allocation> {
        let count = request.activity.staff_count as usize;
        let candidates = self.candidates(request.activity);
        if candidates.len() < count {
            return None;
        }

        let _section = self.section.lock().unwrap_or_else(PoisonError::into_inner);
        let staff = self.commit_window(&candidates, count, request, start, end)?;

        log::debug!("Order {} activity {} staffed by {:?} from {} to {}.", request.order_id, request.activity.id, staff, hhmm(start), hhmm(end));
        Some(Allocation { activity_id: request.activity.id, units: staff.into_iter().map(AllocatedUnit::Staff).collect(), start, end })
    }

    fn release_by_order(&self, order_id: OrderId) -> usize {
        self.release_where(|held| held.order_id == order_id)
    }

    fn release_by_activity(&self, activity_id: ActivityId, order_id: OrderId) -> usize {
        self.release_where(|held| held.order_id == order_id && held.activity_id == activity_id)
    }

    fn release_finished(&self, now: Timestamp) -> usize {
        self.release_where(|held| held.end <= now)
    }
}
