use std::fmt;

/// Lifecycle of a production order across the allocation (phase 1) and execution (phase 2) passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderStatus {
    /// Received, not yet allocated.
    Pending,

    /// Every activity was committed directly.
    Allocated,

    /// At least one activity holds a reservation below the minimum batch size.
    CapacityRestricted,

    /// Direct allocation failed and no reservation path was available.
    AllocationFailed,

    /// Reservations were promoted (or none were needed); production may run.
    InExecution,

    /// Reservations are still below the threshold; retried on the next execution pass.
    AwaitingGrouping,

    /// Reservations never reached the threshold within the waiting policy.
    CapacityCancelled,

    Completed,
    Cancelled,
    Error,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Error)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OrderStatus::AllocationFailed | OrderStatus::CapacityCancelled)
    }

    /// Orders in these states hold reservations that phase 2 tries to confirm.
    pub fn awaits_confirmation(&self) -> bool {
        matches!(self, OrderStatus::CapacityRestricted | OrderStatus::AwaitingGrouping)
    }

    /// The transition table of the two-phase state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self.is_terminal() {
            return false;
        }

        if next.is_terminal() {
            return !self.is_failure();
        }

        match (self, next) {
            (Pending, Allocated | CapacityRestricted | AllocationFailed) => true,
            (CapacityRestricted, InExecution | AwaitingGrouping | CapacityCancelled) => true,
            (AwaitingGrouping, InExecution | AwaitingGrouping | CapacityCancelled) => true,
            (Allocated, InExecution) => true,
            // A failed allocation may be retried, e.g. with a relaxed deadline.
            (AllocationFailed, Pending) => true,
            _ => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Allocated => "ALLOCATED",
            OrderStatus::CapacityRestricted => "CAPACITY_RESTRICTED",
            OrderStatus::AllocationFailed => "ALLOCATION_FAILED",
            OrderStatus::InExecution => "IN_EXECUTION",
            OrderStatus::AwaitingGrouping => "AWAITING_GROUPING",
            OrderStatus::CapacityCancelled => "CAPACITY_CANCELLED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
