pub mod health;
pub mod trigger;
pub mod webhook;
