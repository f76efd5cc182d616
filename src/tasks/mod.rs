//! Background Tasks Module
//!
//! Periodic loops that run alongside the client and the server.
//!
//! # Tasks
//! - Sweep: evicts aged entries from a client's local store
//! - Expiry: asks the server coordinator to invalidate keys past their deadline

mod expiry;
mod sweep;

pub use expiry::spawn_expiry_task;
pub use sweep::{spawn_sweep_task, sweep_interval};
