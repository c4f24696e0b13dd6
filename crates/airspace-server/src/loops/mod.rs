//! Background loops for continuous processing.

pub mod lease_sweep_loop;
