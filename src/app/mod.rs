//! Application wiring

pub mod context;
pub mod state;

pub use context::{Owner, Registry, Services};
pub use state::AppState;
