//! tether-core - Core library for Tether
//!
//! Provisions short-lived companion resources for long-lived templates,
//! tracks the mapping durably and reclaims companions once unused. Shared
//! by the tether CLI and tether-server:
//!
//! - **lifecycle**: Per-template state machine, keyed serialization, dispatch
//! - **store**: SQLite-backed mapping store, archive and template registry
//! - **gateway**: Platform boundary (HTTP bridge, in-memory, timeout decorator)
//! - **membership**: Voice-state normalization and reclaim eligibility
//! - **naming**: Numbered companion names
//! - **sweeper**: Periodic reconciliation pass

pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod membership;
pub mod naming;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-export commonly used types
pub use config::LifecycleConfig;
pub use error::{Error, Result};
pub use lifecycle::{Dispatcher, LifecycleContext, LifecycleManager, Notification, Outcome};
pub use store::{MappingStore, SqliteMappingStore};
pub use sweeper::SweepReport;
