//! Shared library surface for the airspace server binary and its tests.

pub mod audit_log;
pub mod config;
pub mod loops;
pub mod state;
