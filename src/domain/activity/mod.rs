pub mod activity;
pub mod duration;
