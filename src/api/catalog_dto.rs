use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::config::SchedulerConfig;
use crate::domain::resource::category::EquipmentCategory;
use crate::domain::resource::staff::StaffType;
use crate::domain::resource::technical::{ConfigRequirement, TechnicalProfile};

/// Root of the static production catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDto {
    #[serde(default)]
    pub categorias: Vec<CategoryDto>,
    pub equipamentos: Vec<EquipmentDto>,
    #[serde(default)]
    pub funcionarios: Vec<StaffDto>,
    pub atividades: Vec<ActivityDto>,
    #[serde(default)]
    pub configuracao: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDto {
    pub tipo: EquipmentCategory,
    #[serde(default)]
    pub suporta_agrupamento: bool,

    /// `HH:MM:SS`
    #[serde(default)]
    pub timeout_reserva: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EquipmentDto {
    pub id: u64,
    pub nome: String,
    pub tipo: EquipmentCategory,
    #[serde(default)]
    pub capacidade_min: i64,
    pub capacidade_max: i64,
    #[serde(default = "default_fip")]
    pub fip: i64,
    #[serde(default)]
    pub perfil: TechnicalProfile,

    /// `HH:MM:SS`
    #[serde(default)]
    pub timeout_reserva: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaffDto {
    pub id: u64,
    pub nome: String,
    pub tipo_profissional: StaffType,
    #[serde(default = "default_fip")]
    pub fip: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurationBandDto {
    pub quantidade_min: i64,
    pub quantidade_max: i64,

    /// `HH:MM:SS`
    pub duracao: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityDto {
    pub id: u64,
    pub nome: String,
    #[serde(default)]
    pub tipo_atividade: String,

    /// Category -> number of units used together.
    #[serde(default)]
    pub tipo_equipamento: BTreeMap<EquipmentCategory, u32>,
    #[serde(default)]
    pub equipamentos_elegiveis: Vec<u64>,

    /// Keys are equipment ids as strings, as JSON object keys must be.
    #[serde(default)]
    pub fips_equipamentos: HashMap<String, i64>,
    #[serde(default)]
    pub configuracoes_equipamentos: HashMap<String, ConfigRequirement>,

    #[serde(default)]
    pub tipos_profissionais_permitidos: Vec<StaffType>,
    #[serde(default)]
    pub quantidade_funcionarios: u32,

    pub faixas: Vec<DurationBandDto>,

    /// `HH:MM:SS`
    #[serde(default)]
    pub tempo_maximo_de_espera: Option<String>,
}

fn default_fip() -> i64 {
    1
}
