//! # Kestrel Runtime
//!
//! Operator-input acquisition and robot mode scheduling.
//!
//! Two long-lived OS threads share a handful of `Arc`-owned objects:
//!
//! ```text
//!  ┌──────────────┐  wait_for_data   ┌────────────────────┐
//!  │ StatusSource │◄─────────────────│ acquisition thread │ (SCHED_FIFO)
//!  └──────────────┘  packet fields   └─────────┬──────────┘
//!                                              │ commit (one lock)
//!                    ┌─────────────────────────┼───────────────────────┐
//!                    ▼                         ▼                       ▼
//!            ┌───────────────┐        ┌────────────────┐     every 2nd / 4th cycle
//!            │ JoystickCache │        │ NewDataSignal  │     TelemetrySink::publish
//!            └───────┬───────┘        └───────┬────────┘     SafetyRegistry::check_all
//!                    │ read_axis/...          │ wait / is_new_data
//!                    ▼                        ▼
//!            ┌─────────────────────────────────────────┐
//!            │ ModeScheduler (main thread)             │
//!            │  exit → activate → enter → periodic     │
//!            └────────────────────┬────────────────────┘
//!                                 ▼
//!                       ModeTable → RobotMode hooks
//! ```
//!
//! [`station::DriverStation`] bundles the shared state and is what a host
//! application talks to.

#![deny(clippy::disallowed_types)]

pub mod acquisition;
pub mod complain;
pub mod config;
pub mod drivers;
pub mod joystick;
pub mod mode;
pub mod safety;
pub mod signal;
pub mod source_registry;
pub mod station;
pub mod telemetry;

pub use crate::mode::{ModeScheduler, RobotMode};
pub use crate::source_registry::SourceRegistry;
pub use crate::station::DriverStation;
