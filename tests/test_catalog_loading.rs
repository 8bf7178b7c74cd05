mod common;

use serde_json::Value;
use std::sync::Arc;

use common::*;
use production_scheduler::api::catalog_dto::CatalogDto;
use production_scheduler::domain::order::status::OrderStatus;
use production_scheduler::domain::scheduler::ProductionScheduler;
use production_scheduler::domain::simulator::simulator::SystemSimulator;
use production_scheduler::domain::simulator::simulator_mock::MockSimulator;
use production_scheduler::domain::system::ProductionSystem;
use production_scheduler::domain::utils::id::{ActivityId, EquipmentId, OrderId};
use production_scheduler::error::Error;
use production_scheduler::{generate_production_system, load_catalog, load_orders};

fn data_file(name: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn catalog_value() -> Value {
    let text = std::fs::read_to_string(data_file("catalog.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn convert(catalog: Value) -> Result<ProductionSystem, Error> {
    let dto: CatalogDto = serde_json::from_value(catalog)?;
    let simulator: Arc<dyn SystemSimulator> = Arc::new(MockSimulator::new(SHIFT_START));
    ProductionSystem::try_from((dto, simulator))
}

#[test]
fn catalog_file_builds_the_production_floor() {
    let system = generate_production_system(&data_file("catalog.json"), Arc::new(MockSimulator::new(SHIFT_START))).unwrap();

    assert_eq!(system.activities().len(), 3);
    assert_eq!(system.staff().len(), 2);
    assert_eq!(system.equipment_managers().count(), 4);
    assert_eq!(system.config().max_waiting_passes, 3);

    let mixing = system.activity(ActivityId::new(MIXING)).unwrap();
    assert_eq!(mixing.duration_for(4_000).unwrap(), 600);
    assert_eq!(mixing.duration_for(5_001).unwrap(), 1_200);
    assert!(matches!(mixing.duration_for(60_000), Err(Error::OutOfRangeQuantity { .. })));
}

#[test]
fn orders_file_is_parsed_in_utc() {
    let orders = load_orders(&data_file("orders.json")).unwrap();

    assert_eq!(orders.len(), 3);
    assert_eq!(orders[0].shift_start, SHIFT_START);
    assert_eq!(orders[0].deadline, DEADLINE);
    assert_eq!(orders[1].activities, vec![ActivityId::new(MIXING), ActivityId::new(SHAPING), ActivityId::new(BAKING)]);
    assert!(orders.iter().all(|order| order.status() == OrderStatus::Pending));
}

#[test]
fn loaded_orders_run_through_both_phases() {
    let clock = MockSimulator::new(SHIFT_START);
    let system = generate_production_system(&data_file("catalog.json"), Arc::new(clock.clone())).unwrap();
    let scheduler = ProductionScheduler::new(system);
    for order in load_orders(&data_file("orders.json")).unwrap() {
        scheduler.submit(order).unwrap();
    }

    let statuses = scheduler.run_allocation_pass().unwrap();
    assert_eq!(statuses[&OrderId::new(1)], OrderStatus::Allocated);
    assert_eq!(statuses[&OrderId::new(2)], OrderStatus::CapacityRestricted);
    assert_eq!(statuses[&OrderId::new(3)], OrderStatus::CapacityRestricted);

    // The activity ranks mixer 1 first, overriding the units' own weights.
    let agenda = scheduler.system().agenda();
    let direct = entries_of(&agenda, 1).into_iter().find(|entry| entry.activity_id == ActivityId::new(MIXING)).unwrap();
    assert_eq!(direct.equipment_id, EquipmentId::new(MIXER_1));

    // Mixer 2 carries the shorter reservation lifetime.
    let groups = scheduler.reservation_status();
    assert_eq!(groups[0].members[0].expires_in_s, 300);

    let report = scheduler.run_execution_pass();
    assert_eq!(report.confirmed, vec![OrderId::new(2), OrderId::new(3)]);

    let agenda = scheduler.system().agenda();
    let batch: Vec<_> = agenda.iter().filter(|entry| entry.activity_id == ActivityId::new(MIXING) && entry.order_id != OrderId::new(1)).collect();
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|entry| entry.equipment_id == EquipmentId::new(MIXER_1) && entry.start == batch[0].start));
}

#[test]
fn agenda_export_writes_one_row_per_share() {
    let clock = MockSimulator::new(SHIFT_START);
    let scheduler = scheduler(default_catalog(), &clock);
    scheduler.submit(order(1, 4_000, &[MIXING, SHAPING, BAKING], DEADLINE)).unwrap();
    scheduler.run_allocation_pass().unwrap();

    let path = std::env::temp_dir().join(format!("production_scheduler_agenda_{}.csv", std::process::id()));
    let rows = scheduler.export_agenda(path.to_str().unwrap()).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(rows, 4);
    assert_eq!(written.lines().count(), 5);
    assert!(written.starts_with("equipamento_id;"));
    assert!(written.contains("2025-06-26 13:20:00"));
}

#[test]
fn unknown_eligible_equipment_is_rejected() {
    let mut catalog = catalog_value();
    catalog["atividades"][2]["equipamentos_elegiveis"] = serde_json::json!([10, 99]);

    let result = convert(catalog);
    assert!(matches!(result, Err(Error::ModelConstructionError(message)) if message.contains("unknown equipment 99")));
}

#[test]
fn malformed_durations_are_rejected() {
    let mut catalog = catalog_value();
    catalog["atividades"][0]["faixas"][0]["duracao"] = Value::from("10 minutos");
    assert!(convert(catalog).is_err());

    let mut catalog = catalog_value();
    catalog["atividades"][0]["tempo_maximo_de_espera"] = Value::from("00:99:00");
    assert!(convert(catalog).is_err());
}

#[test]
fn inverted_capacity_is_rejected() {
    let mut catalog = catalog_value();
    catalog["equipamentos"][0]["capacidade_min"] = Value::from(30_000);
    assert!(matches!(convert(catalog), Err(Error::ModelConstructionError(_))));
}

#[test]
fn unknown_category_fails_to_deserialize() {
    let mut catalog = catalog_value();
    catalog["equipamentos"][0]["tipo"] = Value::from("FOGUETES");
    assert!(matches!(convert(catalog), Err(Error::DeserializationError(_))));
}

#[test]
fn missing_catalog_is_an_io_error() {
    assert!(matches!(load_catalog(&data_file("missing.json")), Err(Error::IoError(_))));
}

#[test]
fn missing_configuration_uses_defaults() {
    let mut catalog = catalog_value();
    catalog.as_object_mut().unwrap().remove("configuracao");

    let system = convert(catalog).unwrap();
    assert_eq!(system.config().granularity_s, 60);
    assert_eq!(system.config().worker_threads, 1);
}
