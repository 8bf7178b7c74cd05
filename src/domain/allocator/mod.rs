pub mod composite_allocator;
