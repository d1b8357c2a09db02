pub mod payload;
pub mod ports;
