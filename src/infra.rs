pub mod catalog;
pub mod memory;
pub mod postgres;
