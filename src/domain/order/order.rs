use crate::api::order_dto::OrderDto;
use crate::domain::order::status::OrderStatus;
use crate::domain::utils::id::{ActivityId, OrderId, Timestamp, parse_datetime};
use crate::error::{Error, Result};

/// One recorded status change with the reason given by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub reason: String,
}

/// A production order: a quantity of product whose activity chain must finish by the deadline.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub product: String,
    pub quantity: i64,

    /// Lower bound of every backward search (start of the production shift).
    pub shift_start: Timestamp,

    /// The chain's last activity must end at or before this instant.
    pub deadline: Timestamp,

    /// Activities in dependency order: each one ends before the next one starts.
    pub activities: Vec<ActivityId>,

    status: OrderStatus,
    history: Vec<StatusChange>,
}

impl Order {
    pub fn new(id: OrderId, product: impl Into<String>, quantity: i64, shift_start: Timestamp, deadline: Timestamp, activities: Vec<ActivityId>) -> Self {
        Self { id, product: product.into(), quantity, shift_start, deadline, activities, status: OrderStatus::Pending, history: Vec::new() }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// Only the status controller changes an order's status.
    pub(crate) fn record_status(&mut self, to: OrderStatus, reason: impl Into<String>) {
        self.history.push(StatusChange { from: self.status, to, reason: reason.into() });
        self.status = to;
    }
}

impl TryFrom<OrderDto> for Order {
    type Error = Error;

    fn try_from(dto: OrderDto) -> Result<Self> {
        let shift_start = parse_datetime(&dto.inicio_jornada)?;
        let deadline = parse_datetime(&dto.fim_jornada)?;

        if deadline <= shift_start {
            return Err(Error::ModelConstructionError(format!("order {}: shift ends before it starts", dto.id)));
        }
        if dto.quantidade <= 0 {
            return Err(Error::ModelConstructionError(format!("order {}: quantity must be positive", dto.id)));
        }
        if dto.atividades.is_empty() {
            return Err(Error::ModelConstructionError(format!("order {}: no activities", dto.id)));
        }

        Ok(Order::new(
            OrderId::new(dto.id),
            dto.produto,
            dto.quantidade,
            shift_start,
            deadline,
            dto.atividades.into_iter().map(ActivityId::new).collect(),
        ))
    }
}
