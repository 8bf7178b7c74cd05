use crate::api::catalog_dto::EquipmentDto;
use crate::domain::activity::duration::parse_hms;
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::resource::technical::TechnicalProfile;
use crate::domain::utils::id::{ActivityId, EquipmentId, OrderId, Timestamp, hhmm};
use crate::error::{Error, Result};

/// The part of an occupation that belongs to one order.
///
/// Direct allocations carry exactly one share. A promoted reservation group carries one share
/// per grouped order, all bound to the same unit and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupationShare {
    pub order_id: OrderId,
    pub quantity: i64,
}

/// A committed interval `[start, end)` on one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupation {
    pub activity_id: ActivityId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub shares: Vec<OccupationShare>,
}

impl Occupation {
    pub fn single(order_id: OrderId, activity_id: ActivityId, quantity: i64, start: Timestamp, end: Timestamp) -> Self {
        Self { activity_id, start, end, shares: vec![OccupationShare { order_id, quantity }] }
    }

    pub fn quantity(&self) -> i64 {
        self.shares.iter().map(|share| share.quantity).sum()
    }

    pub fn involves(&self, order_id: OrderId) -> bool {
        self.shares.iter().any(|share| share.order_id == order_id)
    }

    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        start < self.end && self.start < end
    }
}

struct SlotKey {
    activity_id: ActivityId,
    start: Timestamp,
    end: Timestamp,
}

/// One physical unit of production equipment.
#[derive(Debug, Clone)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub category: EquipmentCategory,

    /// Minimum batch size. Zero means no restriction.
    pub capacity_min: i64,

    /// Maximum quantity one occupation may carry.
    pub capacity_max: i64,

    /// Default priority weight, lower is preferred. Activities may override it per unit.
    pub fip: i64,

    pub profile: TechnicalProfile,

    /// Lifetime of reservations targeting this unit, when it differs from the category default.
    pub reservation_timeout_s: Option<i64>,

    /// Sorted by start, never overlapping.
    occupations: Vec<Occupation>,
}

impl Equipment {
    pub fn new(
        id: EquipmentId,
        name: impl Into<String>,
        category: EquipmentCategory,
        capacity_min: i64,
        capacity_max: i64,
        fip: i64,
        profile: TechnicalProfile,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            capacity_min,
            capacity_max,
            fip,
            profile,
            reservation_timeout_s: None,
            occupations: Vec::new(),
        }
    }

    pub fn with_reservation_timeout(mut self, timeout_s: Option<i64>) -> Self {
        self.reservation_timeout_s = timeout_s;
        self
    }

    pub fn occupations(&self) -> &[Occupation] {
        &self.occupations
    }

    /// True if the quantity lies within the unit's batch bounds.
    pub fn accepts_quantity(&self, quantity: i64) -> bool {
        quantity > 0 && quantity <= self.capacity_max && quantity >= self.capacity_min
    }

    /// Sum of quantities committed in occupations overlapping `[start, end)`.
    pub fn load_within(&self, start: Timestamp, end: Timestamp) -> i64 {
        self.occupations.iter().filter(|occupation| occupation.overlaps(start, end)).map(Occupation::quantity).sum()
    }

    pub fn is_free(&self, start: Timestamp, end: Timestamp) -> bool {
        !self.occupations.iter().any(|occupation| occupation.overlaps(start, end))
    }

    /// Window check for a new occupation: no overlap and the running total stays within `capacity_max`.
    pub fn can_host(&self, quantity: i64, start: Timestamp, end: Timestamp) -> bool {
        start < end && self.is_free(start, end) && self.load_within(start, end) + quantity <= self.capacity_max
    }

    /// Commits the occupation if the window is still feasible. Returns false otherwise.
    pub fn occupy(&mut self, occupation: Occupation) -> bool {
        if !self.can_host(occupation.quantity(), occupation.start, occupation.end) {
            log::warn!(
                "{} cannot host activity {} ({} units) between {} and {}.",
                self.name,
                occupation.activity_id,
                occupation.quantity(),
                hhmm(occupation.start),
                hhmm(occupation.end)
            );
            return false;
        }

        log::debug!(
            "{} occupied by activity {} ({} units) from {} to {}.",
            self.name,
            occupation.activity_id,
            occupation.quantity(),
            hhmm(occupation.start),
            hhmm(occupation.end)
        );

        let position = self.occupations.partition_point(|existing| existing.start < occupation.start);
        self.occupations.insert(position, occupation);
        true
    }

    /// Removes the order's share from every occupation; occupations left without shares are dropped.
    /// Returns the number of shares removed.
    pub fn release_by_order(&mut self, order_id: OrderId) -> usize {
        self.release_shares(|_, share| share.order_id == order_id)
    }

    pub fn release_by_activity(&mut self, activity_id: ActivityId, order_id: OrderId) -> usize {
        self.release_shares(|slot, share| slot.activity_id == activity_id && share.order_id == order_id)
    }

    /// Removes one exact window placed for an order, used to undo a partial multi-unit placement.
    pub fn release_window(&mut self, activity_id: ActivityId, order_id: OrderId, start: Timestamp, end: Timestamp) -> usize {
        self.release_shares(|slot, share| slot.activity_id == activity_id && share.order_id == order_id && slot.start == start && slot.end == end)
    }

    /// Drops occupations that ended at or before `now`.
    pub fn release_finished(&mut self, now: Timestamp) -> usize {
        let before = self.occupations.len();
        self.occupations.retain(|occupation| occupation.end > now);
        before - self.occupations.len()
    }

    fn release_shares<F>(&mut self, matches: F) -> usize
    where
        F: Fn(&SlotKey, &OccupationShare) -> bool,
    {
        let mut released = 0;

        for occupation in self.occupations.iter_mut() {
            let slot = SlotKey { activity_id: occupation.activity_id, start: occupation.start, end: occupation.end };
            let before = occupation.shares.len();
            occupation.shares.retain(|share| !matches(&slot, share));
            released += before - occupation.shares.len();
        }

        self.occupations.retain(|occupation| !occupation.shares.is_empty());
        released
    }
}

impl TryFrom<EquipmentDto> for Equipment {
    type Error = Error;

    fn try_from(dto: EquipmentDto) -> Result<Self> {
        if dto.capacidade_max <= 0 || dto.capacidade_min < 0 || dto.capacidade_min > dto.capacidade_max {
            return Err(Error::ModelConstructionError(format!(
                "equipment {} ({}): invalid capacity [{}, {}]",
                dto.id, dto.nome, dto.capacidade_min, dto.capacidade_max
            )));
        }

        let timeout = dto.timeout_reserva.as_deref().map(parse_hms).transpose()?;

        Ok(Equipment::new(EquipmentId::new(dto.id), dto.nome, dto.tipo, dto.capacidade_min, dto.capacidade_max, dto.fip, dto.perfil)
            .with_reservation_timeout(timeout))
    }
}
