use std::collections::{BTreeMap, HashMap};

use crate::api::catalog_dto::ActivityDto;
use crate::domain::activity::duration::{DurationBand, DurationTable, parse_hms};
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::resource::staff::StaffType;
use crate::domain::resource::technical::ConfigRequirement;
use crate::domain::utils::id::{ActivityId, EquipmentId};
use crate::error::{Error, Result};

/// A production step as described by the catalog. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub kind: String,

    /// Required equipment categories and how many distinct units of each are occupied together.
    pub equipment_requirements: BTreeMap<EquipmentCategory, u32>,

    pub eligible_equipment: Vec<EquipmentId>,

    /// Activity specific priority weights; units without an entry use their own default.
    pub equipment_fips: HashMap<EquipmentId, i64>,

    pub configurations: HashMap<EquipmentId, ConfigRequirement>,

    pub staff_types: Vec<StaffType>,
    pub staff_count: u32,

    pub durations: DurationTable,

    /// Longest idle gap allowed between the end of this activity and the start of the next one.
    pub max_wait_s: Option<i64>,
}

impl Activity {
    pub fn duration_for(&self, quantity: i64) -> Result<i64> {
        self.durations.resolve(quantity)
    }

    pub fn is_eligible(&self, equipment_id: EquipmentId) -> bool {
        self.eligible_equipment.contains(&equipment_id)
    }

    pub fn requirement_for(&self, equipment_id: EquipmentId) -> &ConfigRequirement {
        static NO_REQUIREMENT: ConfigRequirement = ConfigRequirement::None;
        self.configurations.get(&equipment_id).unwrap_or(&NO_REQUIREMENT)
    }

    pub fn fip_for(&self, equipment_id: EquipmentId, default_fip: i64) -> i64 {
        self.equipment_fips.get(&equipment_id).copied().unwrap_or(default_fip)
    }

    pub fn units_required(&self, category: EquipmentCategory) -> u32 {
        self.equipment_requirements.get(&category).copied().unwrap_or(0)
    }

    pub fn needs_staff(&self) -> bool {
        self.staff_count > 0
    }
}

/// JSON object keys are strings; equipment ids inside them must still be numeric.
fn equipment_key(activity_id: u64, key: &str) -> Result<EquipmentId> {
    key.trim()
        .parse::<u64>()
        .map(EquipmentId::new)
        .map_err(|_| Error::ModelConstructionError(format!("activity {}: '{}' is not an equipment id", activity_id, key)))
}

impl TryFrom<ActivityDto> for Activity {
    type Error = Error;

    fn try_from(dto: ActivityDto) -> Result<Self> {
        let bands = dto
            .faixas
            .iter()
            .map(|band| {
                Ok(DurationBand { quantity_min: band.quantidade_min, quantity_max: band.quantidade_max, duration_s: parse_hms(&band.duracao)? })
            })
            .collect::<Result<Vec<_>>>()?;

        let durations = DurationTable::new(bands)?;

        let equipment_fips = dto
            .fips_equipamentos
            .iter()
            .map(|(key, fip)| Ok((equipment_key(dto.id, key)?, *fip)))
            .collect::<Result<HashMap<_, _>>>()?;

        let configurations = dto
            .configuracoes_equipamentos
            .into_iter()
            .map(|(key, requirement)| Ok((equipment_key(dto.id, &key)?, requirement)))
            .collect::<Result<HashMap<_, _>>>()?;

        if dto.quantidade_funcionarios > 0 && dto.tipos_profissionais_permitidos.is_empty() {
            return Err(Error::ModelConstructionError(format!("activity {} needs staff but allows no staff type", dto.id)));
        }

        let max_wait_s = dto.tempo_maximo_de_espera.as_deref().map(parse_hms).transpose()?;

        Ok(Activity {
            id: ActivityId::new(dto.id),
            name: dto.nome,
            kind: dto.tipo_atividade,
            equipment_requirements: dto.tipo_equipamento,
            eligible_equipment: dto.equipamentos_elegiveis.into_iter().map(EquipmentId::new).collect(),
            equipment_fips,
            configurations,
            staff_types: dto.tipos_profissionais_permitidos,
            staff_count: dto.quantidade_funcionarios,
            durations,
            max_wait_s,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn dto(overrides: Value) -> ActivityDto {
        let mut base = json!({
            "id": 7,
            "nome": "Forneamento",
            "tipo_atividade": "COCCAO",
            "tipo_equipamento": { "FORNOS": 1 },
            "equipamentos_elegiveis": [10, 11],
            "faixas": [ { "quantidade_min": 1, "quantidade_max": 50000, "duracao": "00:40:00" } ]
        });
        if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
            base.extend(overrides.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn catalog_entry_becomes_an_activity() {
        let activity = Activity::try_from(dto(json!({
            "fips_equipamentos": { "11": 0 },
            "configuracoes_equipamentos": { " 10 ": { "tipo": "temperature", "temperatura": 180 } },
            "tempo_maximo_de_espera": "00:05:00"
        })))
        .unwrap();

        assert_eq!(activity.id, ActivityId::new(7));
        assert_eq!(activity.units_required(EquipmentCategory::Ovens), 1);
        assert_eq!(activity.fip_for(EquipmentId::new(11), 3), 0);
        assert_eq!(activity.fip_for(EquipmentId::new(10), 3), 3);
        assert!(activity.configurations.contains_key(&EquipmentId::new(10)));
        assert_eq!(activity.max_wait_s, Some(300));
        assert_eq!(activity.duration_for(20_000).unwrap(), 2_400);
        assert!(!activity.needs_staff());
    }

    #[test]
    fn non_numeric_fip_key_is_rejected() {
        let result = Activity::try_from(dto(json!({ "fips_equipamentos": { "forno": 1 } })));
        assert!(matches!(result, Err(Error::ModelConstructionError(message)) if message.contains("'forno' is not an equipment id")));
    }

    #[test]
    fn non_numeric_configuration_key_is_rejected() {
        let result = Activity::try_from(dto(json!({
            "configuracoes_equipamentos": { "10a": { "tipo": "temperature", "temperatura": 180 } }
        })));
        assert!(matches!(result, Err(Error::ModelConstructionError(message)) if message.contains("activity 7")));
    }

    #[test]
    fn staff_count_without_staff_types_is_rejected() {
        let result = Activity::try_from(dto(json!({ "quantidade_funcionarios": 1 })));
        assert!(matches!(result, Err(Error::ModelConstructionError(message)) if message.contains("allows no staff type")));

        let staffed = Activity::try_from(dto(json!({ "quantidade_funcionarios": 1, "tipos_profissionais_permitidos": ["PADEIRO"] }))).unwrap();
        assert!(staffed.needs_staff());
    }

    #[test]
    fn malformed_max_wait_is_rejected() {
        assert!(Activity::try_from(dto(json!({ "tempo_maximo_de_espera": "cinco minutos" }))).is_err());
    }
}
