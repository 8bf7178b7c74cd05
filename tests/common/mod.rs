#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;

use production_scheduler::api::catalog_dto::CatalogDto;
use production_scheduler::domain::order::order::Order;
use production_scheduler::domain::scheduler::ProductionScheduler;
use production_scheduler::domain::simulator::simulator::SystemSimulator;
use production_scheduler::domain::simulator::simulator_mock::MockSimulator;
use production_scheduler::domain::system::{AgendaEntry, ProductionSystem};
use production_scheduler::domain::utils::id::{ActivityId, EquipmentId, OrderId};

/// 2025-06-26 06:00:00 UTC
pub const SHIFT_START: i64 = 1_750_917_600;
pub const DEADLINE: i64 = SHIFT_START + 8 * 3_600;

pub const MIXING: u64 = 100;
pub const SHAPING: u64 = 101;
pub const BAKING: u64 = 102;
pub const TIMED_MIXING: u64 = 105;
pub const KNEADING: u64 = 106;

pub const MIXER_1: u64 = 1;
pub const MIXER_2: u64 = 2;
pub const OVEN_1: u64 = 10;
pub const OVEN_2: u64 = 11;

/// Bakery floor: two batching mixers (min 3000, max 20000, mixer 2 preferred), two ovens,
/// one bench, one scale and two bakers.
pub fn catalog(mixer_timeout: &str, max_waiting_passes: u32, threads: usize) -> Value {
    json!({
        "configuracao": {
            "granularidade_s": 60,
            "max_passagens_espera": max_waiting_passes,
            "threads": threads
        },
        "categorias": [
            { "tipo": "MISTURADORAS", "suporta_agrupamento": true, "timeout_reserva": mixer_timeout },
            { "tipo": "FORNOS", "suporta_agrupamento": false },
            { "tipo": "BANCADAS", "suporta_agrupamento": false }
        ],
        "equipamentos": [
            { "id": MIXER_1, "nome": "Masseira 1", "tipo": "MISTURADORAS", "capacidade_min": 3000, "capacidade_max": 20000, "fip": 2,
              "perfil": { "tipo": "mixer", "velocidades": ["BAIXA", "ALTA"], "tipos_mistura": ["LENTA"] } },
            { "id": MIXER_2, "nome": "Masseira 2", "tipo": "MISTURADORAS", "capacidade_min": 3000, "capacidade_max": 20000, "fip": 1,
              "perfil": { "tipo": "mixer", "velocidades": ["BAIXA", "ALTA"], "tipos_mistura": ["LENTA"] } },
            { "id": OVEN_1, "nome": "Forno 1", "tipo": "FORNOS", "capacidade_max": 50000, "fip": 1,
              "perfil": { "tipo": "thermal", "temperatura_min": 120, "temperatura_max": 260 } },
            { "id": OVEN_2, "nome": "Forno 2", "tipo": "FORNOS", "capacidade_max": 50000, "fip": 1,
              "perfil": { "tipo": "thermal", "temperatura_min": 120, "temperatura_max": 260 } },
            { "id": 20, "nome": "Bancada 1", "tipo": "BANCADAS", "capacidade_max": 50000 },
            { "id": 30, "nome": "Balanca 1", "tipo": "BALANCAS", "capacidade_max": 50000 }
        ],
        "funcionarios": [
            { "id": 1, "nome": "Ana", "tipo_profissional": "PADEIRO", "fip": 1 },
            { "id": 2, "nome": "Bruno", "tipo_profissional": "PADEIRO", "fip": 2 }
        ],
        "atividades": [
            {
                "id": MIXING, "nome": "Mistura da massa", "tipo_atividade": "MISTURA",
                "tipo_equipamento": { "MISTURADORAS": 1 },
                "equipamentos_elegiveis": [MIXER_1, MIXER_2],
                "configuracoes_equipamentos": { "1": { "tipo": "mix_speed", "velocidades": ["BAIXA"], "tipo_mistura": "LENTA" },
                                               "2": { "tipo": "mix_speed", "velocidades": ["BAIXA"], "tipo_mistura": "LENTA" } },
                "faixas": [
                    { "quantidade_min": 1, "quantidade_max": 5000, "duracao": "00:10:00" },
                    { "quantidade_min": 5001, "quantidade_max": 50000, "duracao": "00:20:00" }
                ]
            },
            {
                "id": SHAPING, "nome": "Pesagem e modelagem", "tipo_atividade": "MODELAGEM",
                "tipo_equipamento": { "BANCADAS": 1, "BALANCAS": 1 },
                "equipamentos_elegiveis": [20, 30],
                "tipos_profissionais_permitidos": ["PADEIRO"],
                "quantidade_funcionarios": 1,
                "faixas": [ { "quantidade_min": 1, "quantidade_max": 50000, "duracao": "00:30:00" } ]
            },
            {
                "id": BAKING, "nome": "Forneamento", "tipo_atividade": "COCCAO",
                "tipo_equipamento": { "FORNOS": 1 },
                "equipamentos_elegiveis": [OVEN_1, OVEN_2],
                "configuracoes_equipamentos": { "10": { "tipo": "temperature", "temperatura": 180 },
                                               "11": { "tipo": "temperature", "temperatura": 180 } },
                "faixas": [ { "quantidade_min": 1, "quantidade_max": 50000, "duracao": "00:40:00" } ]
            },
            {
                "id": TIMED_MIXING, "nome": "Mistura com descanso curto", "tipo_atividade": "MISTURA",
                "tipo_equipamento": { "MISTURADORAS": 1 },
                "equipamentos_elegiveis": [MIXER_1, MIXER_2],
                "tempo_maximo_de_espera": "00:05:00",
                "faixas": [ { "quantidade_min": 1, "quantidade_max": 20000, "duracao": "00:10:00" } ]
            },
            {
                "id": KNEADING, "nome": "Sova assistida", "tipo_atividade": "MISTURA",
                "tipo_equipamento": { "MISTURADORAS": 1 },
                "equipamentos_elegiveis": [MIXER_1, MIXER_2],
                "tipos_profissionais_permitidos": ["PADEIRO"],
                "quantidade_funcionarios": 1,
                "faixas": [ { "quantidade_min": 1, "quantidade_max": 20000, "duracao": "00:10:00" } ]
            }
        ]
    })
}

pub fn default_catalog() -> Value {
    catalog("00:10:00", 3, 1)
}

pub fn build_system(catalog: Value, clock: &MockSimulator) -> ProductionSystem {
    let dto: CatalogDto = serde_json::from_value(catalog).expect("catalog fixture must deserialize");
    let simulator: Arc<dyn SystemSimulator> = Arc::new(clock.clone());
    ProductionSystem::try_from((dto, simulator)).expect("catalog fixture must convert")
}

pub fn scheduler(catalog: Value, clock: &MockSimulator) -> ProductionScheduler {
    ProductionScheduler::new(build_system(catalog, clock))
}

pub fn order(id: u64, quantity: i64, activities: &[u64], deadline: i64) -> Order {
    Order::new(OrderId::new(id), "pao de forma", quantity, SHIFT_START, deadline, activities.iter().copied().map(ActivityId::new).collect())
}

pub fn entries_of(agenda: &[AgendaEntry], order_id: u64) -> Vec<AgendaEntry> {
    agenda.iter().filter(|entry| entry.order_id == OrderId::new(order_id)).cloned().collect()
}

pub fn entries_on(agenda: &[AgendaEntry], equipment_id: u64) -> Vec<AgendaEntry> {
    agenda.iter().filter(|entry| entry.equipment_id == EquipmentId::new(equipment_id)).cloned().collect()
}
