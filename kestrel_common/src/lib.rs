//! Kestrel Common Library
//!
//! Shared vocabulary for the Kestrel workspace: operating modes, the
//! driver-station status word, the `StatusSource` hardware contract and
//! TOML configuration loading.
//!
//! # Module Structure
//!
//! - [`consts`] - Workspace-wide limits and defaults
//! - [`config`] - Configuration loading traits and types
//! - [`hal`] - StatusSource contract, raw joystick frames, control word
//! - [`mode`] - `GameMode` and mode arbitration from the control word
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use kestrel_common::prelude::*;
//!
//! let word = ControlWord::ENABLED | ControlWord::AUTONOMOUS;
//! assert_eq!(GameMode::from_control_word(word), GameMode::Auton);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod mode;
pub mod prelude;
