use serde::Deserialize;

use crate::api::catalog_dto::StaffDto;
use crate::domain::utils::id::{ActivityId, OrderId, StaffId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum StaffType {
    #[serde(rename = "PADEIRO")]
    Baker,
    #[serde(rename = "AUXILIAR_DE_PADEIRO")]
    BakerAssistant,
    #[serde(rename = "CONFEITEIRO")]
    Confectioner,
    #[serde(rename = "AUXILIAR_DE_CONFEITEIRO")]
    ConfectionerAssistant,
    #[serde(rename = "COZINHEIRO")]
    Cook,
    #[serde(rename = "ALMOXARIFE")]
    Storekeeper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffOccupation {
    pub order_id: OrderId,
    pub activity_id: ActivityId,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A member of the production staff with their own non-overlapping timeline.
#[derive(Debug, Clone)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    pub staff_type: StaffType,
    pub fip: i64,
    occupations: Vec<StaffOccupation>,
}

impl StaffMember {
    pub fn new(id: StaffId, name: impl Into<String>, staff_type: StaffType, fip: i64) -> Self {
        Self { id, name: name.into(), staff_type, fip, occupations: Vec::new() }
    }

    pub fn occupations(&self) -> &[StaffOccupation] {
        &self.occupations
    }

    pub fn is_free(&self, start: Timestamp, end: Timestamp) -> bool {
        !self.occupations.iter().any(|occupation| start < occupation.end && occupation.start < end)
    }

    pub fn occupy(&mut self, occupation: StaffOccupation) -> bool {
        if !self.is_free(occupation.start, occupation.end) {
            return false;
        }
        let position = self.occupations.partition_point(|existing| existing.start < occupation.start);
        self.occupations.insert(position, occupation);
        true
    }

    /// Removes matching occupations and returns how many were removed.
    pub fn release_where<F>(&mut self, matches: F) -> usize
    where
        F: Fn(&StaffOccupation) -> bool,
    {
        let before = self.occupations.len();
        self.occupations.retain(|occupation| !matches(occupation));
        before - self.occupations.len()
    }
}

impl From<StaffDto> for StaffMember {
    fn from(dto: StaffDto) -> Self {
        StaffMember::new(StaffId::new(dto.id), dto.nome, dto.tipo_profissional, dto.fip)
    }
}
