//! Task reminder library
//!
//! This library stores reminder tasks durably, keeps one timer per pending
//! task and delivers each reminder exactly once through whichever
//! notification surface is available when it fires.

mod cli;
mod config;
mod delivery;
mod errors;
mod helper;
mod lock;
mod permission;
mod reconcile;
mod registry;
mod scheduler;
mod service;
mod store;
mod task;
mod types;

// Re-export key components
pub use cli::*;
pub use config::*;
pub use delivery::*;
pub use errors::*;
pub use helper::*;
pub use lock::*;
pub use permission::*;
pub use reconcile::*;
pub use registry::*;
pub use scheduler::*;
pub use service::*;
pub use store::*;
pub use task::*;
pub use types::*;
