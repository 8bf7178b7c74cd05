pub mod order;
pub mod status;
