pub mod order_orchestrator;
pub mod rollback;
pub mod status_controller;
