pub mod activity;
pub mod allocator;
pub mod manager;
pub mod orchestrator;
pub mod order;
pub mod resource;
pub mod scheduler;
pub mod simulator;
pub mod system;
pub mod utils;
