use thiserror::Error;

use crate::domain::order::status::OrderStatus;
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::utils::id::{ActivityId, OrderId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to write CSV output: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Failed to build internal domain model: {0}")]
    ModelConstructionError(String),

    /// No duration band of the activity covers the quantity. Configuration error, never retried.
    #[error("Quantity {quantity} is outside the configured duration bands [{lowest}, {highest}]")]
    OutOfRangeQuantity { quantity: i64, lowest: i64, highest: i64 },

    /// No feasible window was found on any candidate before the lower bound was reached.
    #[error("Allocation failed for activity {activity_id} ({category}) with quantity {quantity} before {not_after}")]
    AllocationFailed { activity_id: ActivityId, category: String, quantity: i64, not_after: i64 },

    #[error("Reservation of order {order_id} for activity {activity_id} expired before it could be grouped")]
    ReservationExpired { order_id: OrderId, activity_id: ActivityId },

    #[error("Activity {0} is not part of the catalog")]
    UnknownActivity(ActivityId),

    #[error("Order {0} is not registered")]
    UnknownOrder(OrderId),

    #[error("No manager is registered for equipment category {0}")]
    NoManagerForCategory(EquipmentCategory),

    #[error("Order {order_id}: transition {from} -> {to} is not allowed")]
    InvalidTransition { order_id: OrderId, from: OrderStatus, to: OrderStatus },

    #[error("Allocation of order {0} was cancelled")]
    Cancelled(OrderId),
}

impl Error {
    /// Short label of the resource kind that caused an allocation failure, used in failure chains.
    pub fn failing_category(&self) -> Option<&str> {
        match self {
            Error::AllocationFailed { category, .. } => Some(category.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
