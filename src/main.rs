use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use production_scheduler::domain::order::status::OrderStatus;
use production_scheduler::domain::scheduler::ProductionScheduler;
use production_scheduler::domain::simulator::simulator::{Simulator, SystemSimulator};
use production_scheduler::domain::system::ProductionSystem;
use production_scheduler::domain::utils::id::format_datetime;
use production_scheduler::domain::utils::statistics;
use production_scheduler::{load_catalog, load_orders, logger};

/// Allocates production orders on the equipment of a bakery floor.
#[derive(Debug, Parser)]
#[command(name = "production_scheduler", version)]
struct Cli {
    /// Catalog JSON with categories, equipment, staff and activities.
    #[arg(long)]
    catalog: String,

    /// Orders JSON.
    #[arg(long)]
    orders: String,

    /// Write the resulting equipment agenda to this CSV file.
    #[arg(long)]
    agenda: Option<String>,

    /// Write one statistics row per scheduling command to this CSV file.
    #[arg(long)]
    stats: Option<String>,

    /// Overrides the backward search step in seconds.
    #[arg(long)]
    granularity: Option<i64>,

    /// Maximum number of execution passes.
    #[arg(long, default_value = "3")]
    passes: u32,
}

fn main() -> Result<()> {
    logger::init();
    let cli = Cli::parse();

    if let Some(stats) = &cli.stats {
        statistics::init_global(Some(stats.clone())).with_context(|| format!("cannot create statistics file '{}'", stats))?;
    }

    let orders = load_orders(&cli.orders).with_context(|| format!("cannot load orders from '{}'", cli.orders))?;
    let start = orders.iter().map(|order| order.shift_start).min().unwrap_or_default();

    let mut catalog = load_catalog(&cli.catalog).with_context(|| format!("cannot load catalog from '{}'", cli.catalog))?;
    if let Some(granularity) = cli.granularity {
        catalog.configuracao.granularity_s = granularity;
    }
    let system = ProductionSystem::try_from((catalog, Arc::new(Simulator::starting_at(start)) as Arc<dyn SystemSimulator>))
        .context("cannot build the production system")?;

    let scheduler = ProductionScheduler::new(system);
    for order in orders {
        let id = order.id;
        if let Err(e) = scheduler.submit(order) {
            log::error!("Order {} rejected: {}", id, e);
        }
    }

    scheduler.run_allocation_pass()?;

    for pass in 1..=cli.passes {
        let report = scheduler.run_execution_pass();
        log::info!("Execution pass {}: {:?}", pass, report);
        if report.waiting.is_empty() {
            break;
        }
    }

    for record in scheduler.records() {
        let window = record
            .plan
            .as_ref()
            .and_then(|plan| Some((plan.start()?, plan.end()?)))
            .map(|(start, end)| format!("{} -> {}", format_datetime(start), format_datetime(end)))
            .unwrap_or_default();

        println!("{:>6} {:<24} {:<20} {}", record.order.id, record.order.product, record.order.status().code(), window);

        if matches!(record.order.status(), OrderStatus::AllocationFailed | OrderStatus::CapacityCancelled | OrderStatus::Error) {
            if let Some(failure) = &record.failure {
                println!("       {}", failure);
            }
        }
    }

    if let Some(agenda) = &cli.agenda {
        scheduler.export_agenda(agenda).with_context(|| format!("cannot write agenda to '{}'", agenda))?;
    }

    statistics::flush_global();
    Ok(())
}
