use std::sync::Arc;

use crate::api::catalog_dto::CatalogDto;
use crate::api::order_dto::OrdersDto;
use crate::domain::order::order::Order;
use crate::domain::simulator::simulator::SystemSimulator;
use crate::domain::system::ProductionSystem;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

pub fn load_catalog(file_path: &str) -> Result<CatalogDto> {
    let catalog_dto = parse_json_file::<CatalogDto>(file_path)?;
    log::info!("Catalog '{}' parsed successfully.", file_path);
    Ok(catalog_dto)
}

/// Loads the catalog and builds the production floor with one manager per equipment category.
pub fn generate_production_system(file_path: &str, simulator: Arc<dyn SystemSimulator>) -> Result<ProductionSystem> {
    log::info!("Starting ProductionSystem construction from '{}'.", file_path);

    let catalog_dto = load_catalog(file_path)?;
    let system = ProductionSystem::try_from((catalog_dto, simulator))?;
    log::info!("ProductionSystem constructed successfully.");

    Ok(system)
}

/// Loads the production orders, each with its activity chain in dependency order.
pub fn load_orders(file_path: &str) -> Result<Vec<Order>> {
    let orders_dto: OrdersDto = parse_json_file::<OrdersDto>(file_path)?;
    let orders = orders_dto.pedidos.into_iter().map(Order::try_from).collect::<Result<Vec<_>>>()?;

    log::info!("{} orders loaded from '{}'.", orders.len(), file_path);
    Ok(orders)
}
