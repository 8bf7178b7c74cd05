pub mod agenda_dto;
pub mod catalog_dto;
pub mod order_dto;
