pub mod booking;
pub mod catalog_item;
