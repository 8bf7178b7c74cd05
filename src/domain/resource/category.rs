use std::fmt;

use serde::Deserialize;

/// Equipment categories of the production floor. Each category is served by one equipment manager.
///
/// Catalog names are kept as they appear in the JSON input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum EquipmentCategory {
    #[serde(rename = "MISTURADORAS")]
    Mixers,
    #[serde(rename = "MISTURADORAS_COM_COCCAO")]
    CookingMixers,
    #[serde(rename = "BATEDEIRAS")]
    Beaters,
    #[serde(rename = "BANCADAS")]
    Benches,
    #[serde(rename = "BALANCAS")]
    Scales,
    #[serde(rename = "FORNOS")]
    Ovens,
    #[serde(rename = "FOGOES")]
    Stoves,
    #[serde(rename = "FRITADEIRAS")]
    Fryers,
    #[serde(rename = "REFRIGERACAO_CONGELAMENTO")]
    Refrigeration,
    #[serde(rename = "ARMARIOS_PARA_FERMENTACAO")]
    ProofingCabinets,
    #[serde(rename = "DIVISORAS_BOLEADORAS")]
    DividersRounders,
    #[serde(rename = "MODELADORAS")]
    Shapers,
    #[serde(rename = "EMBALADORAS")]
    Packers,
}

impl fmt::Display for EquipmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EquipmentCategory::Mixers => "mixers",
            EquipmentCategory::CookingMixers => "cooking mixers",
            EquipmentCategory::Beaters => "beaters",
            EquipmentCategory::Benches => "benches",
            EquipmentCategory::Scales => "scales",
            EquipmentCategory::Ovens => "ovens",
            EquipmentCategory::Stoves => "stoves",
            EquipmentCategory::Fryers => "fryers",
            EquipmentCategory::Refrigeration => "refrigeration",
            EquipmentCategory::ProofingCabinets => "proofing cabinets",
            EquipmentCategory::DividersRounders => "dividers and rounders",
            EquipmentCategory::Shapers => "shapers",
            EquipmentCategory::Packers => "packers",
        };
        write!(f, "{}", label)
    }
}

/// Capability of a category to accept sub-minimum quantities as reservations that are grouped later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportsBatching {
    /// Quantities below the unit minimum are rejected by direct allocation.
    No,
    /// Quantities below the unit minimum are reserved and promoted once the group reaches the minimum.
    Yes {
        /// Reservation lifetime used by units that do not configure their own.
        reservation_timeout_s: i64,
    },
}

impl SupportsBatching {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SupportsBatching::Yes { .. })
    }
}

/// Per-category settings resolved once while the catalog is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryConfig {
    pub category: EquipmentCategory,
    pub batching: SupportsBatching,
}

impl CategoryConfig {
    pub fn direct_only(category: EquipmentCategory) -> Self {
        Self { category, batching: SupportsBatching::No }
    }
}
