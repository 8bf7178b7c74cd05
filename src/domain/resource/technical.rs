//! Technical configuration of equipment units and the requirements activities place on them.
//!
//! Each unit declares what it can do as a [`TechnicalProfile`]; each activity may attach a
//! [`ConfigRequirement`] per eligible unit. A unit is only a candidate when the requirement is
//! satisfied by the profile.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Speed {
    #[serde(rename = "BAIXA")]
    Low,
    #[serde(rename = "MEDIA")]
    Medium,
    #[serde(rename = "ALTA")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum MixType {
    #[serde(rename = "LENTA")]
    Slow,
    #[serde(rename = "SEMI_RAPIDA")]
    SemiFast,
    #[serde(rename = "RAPIDA")]
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum FlameLevel {
    #[serde(rename = "BAIXA")]
    Low,
    #[serde(rename = "MEDIA")]
    Medium,
    #[serde(rename = "ALTA")]
    High,
}

/// What a unit supports.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum TechnicalProfile {
    /// Mixers and beaters.
    Mixer {
        #[serde(default, rename = "velocidades")]
        speeds: Vec<Speed>,
        #[serde(default, rename = "tipos_mistura")]
        mix_types: Vec<MixType>,
    },
    /// Ovens, refrigeration and proofing cabinets: a settable temperature range in °C.
    Thermal {
        #[serde(rename = "temperatura_min")]
        min_celsius: i32,
        #[serde(rename = "temperatura_max")]
        max_celsius: i32,
    },
    /// Stoves and cooking mixers.
    Burner {
        #[serde(default, rename = "chamas")]
        flames: Vec<FlameLevel>,
    },
    /// Benches, scales and anything without settings.
    #[default]
    Plain,
}

/// What an activity needs from a unit.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum ConfigRequirement {
    MixSpeed {
        #[serde(default, rename = "velocidades")]
        speeds: Vec<Speed>,
        #[serde(default, rename = "tipo_mistura")]
        mix_type: Option<MixType>,
    },
    Temperature {
        #[serde(rename = "temperatura")]
        celsius: i32,
    },
    Flame {
        #[serde(rename = "chama")]
        level: FlameLevel,
    },
    #[default]
    None,
}

impl ConfigRequirement {
    pub fn is_satisfied_by(&self, profile: &TechnicalProfile) -> bool {
        match (self, profile) {
            (ConfigRequirement::None, _) => true,
            (ConfigRequirement::MixSpeed { speeds, mix_type }, TechnicalProfile::Mixer { speeds: supported, mix_types }) => {
                speeds.iter().all(|speed| supported.contains(speed)) && mix_type.is_none_or(|mix| mix_types.contains(&mix))
            }
            (ConfigRequirement::Temperature { celsius }, TechnicalProfile::Thermal { min_celsius, max_celsius }) => {
                (*min_celsius..=*max_celsius).contains(celsius)
            }
            (ConfigRequirement::Flame { level }, TechnicalProfile::Burner { flames }) => flames.contains(level),
            _ => false,
        }
    }
}
