//! Service layer for tether-server
//!
//! Long-running background work owned by the daemon.

pub mod sweeper;

pub use sweeper::SweeperService;
