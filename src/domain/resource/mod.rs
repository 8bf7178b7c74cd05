pub mod category;
pub mod equipment;
pub mod equipment_store;
pub mod staff;
pub mod technical;
