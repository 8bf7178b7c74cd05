pub mod equipment_manager;
pub mod reservation_book;
pub mod resource_manager;
pub mod staff_pool;
