use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::api::agenda_dto::AgendaRowDto;
use crate::domain::manager::reservation_book::PendingGroupStatus;
use crate::domain::order::order::Order;
use crate::domain::order::status::OrderStatus;
use crate::domain::orchestrator::order_orchestrator::{OrderOrchestrator, Phase1Outcome};
use crate::domain::orchestrator::status_controller::{ExecutionReport, OrderRecord, StatusController};
use crate::domain::system::ProductionSystem;
use crate::domain::utils::id::{OrderId, Timestamp, format_datetime};
use crate::error::{Error, Result};
use crate::loader::writer::write_csv_file;

/// Entry point of the engine: order intake, the allocation pass, execution passes and the
/// order lifecycle on top of one production system.
#[derive(Debug)]
pub struct ProductionScheduler {
    system: Arc<ProductionSystem>,
    controller: Mutex<StatusController>,
    cancel_flags: Mutex<HashMap<OrderId, Arc<AtomicBool>>>,
}

impl ProductionScheduler {
    pub fn new(system: ProductionSystem) -> Self {
        let max_waiting_passes = system.config().max_waiting_passes;
        Self { system: Arc::new(system), controller: Mutex::new(StatusController::new(max_waiting_passes)), cancel_flags: Mutex::new(HashMap::new()) }
    }

    pub fn system(&self) -> &ProductionSystem {
        &self.system
    }

    fn controller(&self) -> MutexGuard<'_, StatusController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_flag(&self, id: OrderId) -> Arc<AtomicBool> {
        let mut flags = self.cancel_flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags.entry(id).or_default().clone()
    }

    pub fn submit(&self, order: Order) -> Result<()> {
        for activity_id in &order.activities {
            self.system.activity(*activity_id)?;
        }
        self.controller().register(order)
    }

    pub fn status(&self, id: OrderId) -> Result<OrderStatus> {
        self.controller().status(id)
    }

    /// Snapshot of an order with its plan and failure report.
    pub fn record(&self, id: OrderId) -> Option<OrderRecord> {
        self.controller().record(id).cloned()
    }

    pub fn records(&self) -> Vec<OrderRecord> {
        self.controller().records().cloned().collect()
    }

    pub fn failure_chain(&self, id: OrderId) -> Option<String> {
        self.controller().failure_chain(id)
    }

    /// Allocates one pending order now.
    pub fn allocate_order(&self, id: OrderId) -> Result<OrderStatus> {
        let order = self.controller().record(id).map(|record| record.order.clone()).ok_or(Error::UnknownOrder(id))?;
        if order.status() != OrderStatus::Pending {
            return Err(Error::InvalidTransition { order_id: id, from: order.status(), to: OrderStatus::Allocated });
        }

        let outcome = OrderOrchestrator::new(&self.system).allocate_order(&order, &self.cancel_flag(id));
        self.controller().apply_phase1(id, outcome, &self.system)
    }

    /// Phase 1 over every pending order.
    ///
    /// With one worker the orders are allocated in id order, which makes placements reproducible.
    /// With more, orders are spread over scoped threads; each manager still serialises its own units.
    /// Status changes are applied afterwards in id order either way.
    pub fn run_allocation_pass(&self) -> Result<BTreeMap<OrderId, OrderStatus>> {
        let pending: Vec<Order> = {
            let controller = self.controller();
            controller.ids_where(|status| status == OrderStatus::Pending).into_iter().filter_map(|id| controller.record(id).map(|r| r.order.clone())).collect()
        };

        let workers = self.system.config().worker_threads.max(1);
        let orchestrator = OrderOrchestrator::new(&self.system);
        let flags: Vec<Arc<AtomicBool>> = pending.iter().map(|order| self.cancel_flag(order.id)).collect();

        let mut outcomes: Vec<(OrderId, Phase1Outcome)> = if workers == 1 || pending.len() < 2 {
            pending.iter().zip(&flags).map(|(order, flag)| (order.id, orchestrator.allocate_order(order, flag))).collect()
        } else {
            let chunk = pending.len().div_ceil(workers);
            thread::scope(|scope| {
                let handles: Vec<_> = pending
                    .chunks(chunk)
                    .zip(flags.chunks(chunk))
                    .map(|(orders, flags)| {
                        let orchestrator = &orchestrator;
                        scope.spawn(move || {
                            orders.iter().zip(flags).map(|(order, flag)| (order.id, orchestrator.allocate_order(order, flag))).collect::<Vec<_>>()
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .flat_map(|handle| match handle.join() {
                        Ok(outcomes) => outcomes,
                        Err(_) => {
                            log::error!("An allocation worker panicked; its orders stay pending.");
                            Vec::new()
                        }
                    })
                    .collect()
            })
        };

        outcomes.sort_by_key(|(id, _)| *id);

        let mut controller = self.controller();
        let mut statuses = BTreeMap::new();
        for (id, outcome) in outcomes {
            match controller.apply_phase1(id, outcome, &self.system) {
                Ok(status) => {
                    statuses.insert(id, status);
                }
                Err(e) => log::error!("Allocation result of order {} could not be applied: {}", id, e),
            }
        }

        log::info!("Allocation pass finished for {} orders.", statuses.len());
        Ok(statuses)
    }

    /// Phase 2: confirm or cancel the orders waiting for their reservation groups.
    pub fn run_execution_pass(&self) -> ExecutionReport {
        self.controller().run_execution_pass(&self.system)
    }

    pub fn start_execution(&self, id: OrderId) -> Result<()> {
        self.controller().transition(id, OrderStatus::InExecution, "execution started")
    }

    pub fn complete(&self, id: OrderId) -> Result<()> {
        self.controller().transition(id, OrderStatus::Completed, "production finished")
    }

    /// Cancels an order at any non-terminal point and releases everything it holds.
    /// An allocation in progress for the order stops before its next activity and rolls back.
    pub fn cancel(&self, id: OrderId) -> Result<()> {
        self.cancel_flag(id).store(true, Ordering::SeqCst);

        let mut controller = self.controller();
        controller.transition(id, OrderStatus::Cancelled, "cancelled by request")?;
        let released = self.system.release_by_order(id);
        log::info!("Order {} cancelled, {} entries released.", id, released);
        Ok(())
    }

    pub fn retry(&self, id: OrderId, deadline: Option<Timestamp>) -> Result<()> {
        self.cancel_flag(id).store(false, Ordering::SeqCst);
        self.controller().retry(id, deadline)
    }

    pub fn reservation_status(&self) -> Vec<PendingGroupStatus> {
        self.system.reservation_status()
    }

    pub fn release_finished(&self, now: Timestamp) -> usize {
        self.system.release_finished(now)
    }

    pub fn agenda_rows(&self) -> Vec<AgendaRowDto> {
        self.system
            .agenda()
            .into_iter()
            .map(|entry| AgendaRowDto {
                equipamento_id: entry.equipment_id.value(),
                equipamento: entry.equipment_name,
                categoria: entry.category.to_string(),
                pedido: entry.order_id.value(),
                atividade: entry.activity_id.value(),
                quantidade: entry.quantity,
                inicio: format_datetime(entry.start),
                fim: format_datetime(entry.end),
            })
            .collect()
    }

    /// Writes the equipment agenda as CSV and returns the number of rows.
    pub fn export_agenda(&self, path: &str) -> Result<usize> {
        let rows = self.agenda_rows();
        write_csv_file(path, &rows)?;
        log::info!("Agenda with {} rows written to '{}'.", rows.len(), path);
        Ok(rows.len())
    }
}
