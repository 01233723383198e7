//! Schema module - Configuration and evaluation record types.

mod behaviour;
mod config;
mod multi_objective;
mod novelty;

pub use behaviour::*;
pub use config::*;
pub use multi_objective::*;
pub use novelty::*;
