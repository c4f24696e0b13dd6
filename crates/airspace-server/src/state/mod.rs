//! Process-wide state shared by the background loops.

pub mod store;

pub use store::AppState;
