pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod server;
pub mod telemetry;
