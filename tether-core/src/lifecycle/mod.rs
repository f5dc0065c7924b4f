//! Companion lifecycle: state machine, per-key serialization and dispatch.
//!
//! ## States
//!
//! ```text
//!            creation trigger              create ok
//!   Idle ─────────────────────► Provisioning ──────────► Active
//!    ▲                               │                    │  │
//!    │          create failed        │                    │  │ template terminal
//!    ├───────────────────────────────┘                    │  └──────────────► Locked
//!    │                                                    │                  (archived)
//!    │      delete ok / NotFound                          │ reclaim trigger,
//!    └──────────────────────────── Reclaiming ◄───────────┘ companion empty
//! ```
//!
//! `Idle`, `Active` and `Locked` are derived from the store (no mapping,
//! active mapping, archived mapping). `Provisioning` and `Reclaiming` only
//! exist while a gateway call is in flight.

mod dispatch;
mod keyed;
mod machine;

pub use dispatch::{Dispatcher, Notification};
pub use keyed::{InFlight, InFlightMark, KeyGuard, KeyedLocks};
pub use machine::{LifecycleContext, LifecycleManager, Outcome, RestoreReport};
