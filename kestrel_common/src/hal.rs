//! Hardware abstraction contract.
//!
//! The runtime never talks to the driver-station link directly; it consumes
//! the [`source::StatusSource`] trait. Backends (simulation, real HAL) live in
//! `kestrel_runtime::drivers`.

pub mod source;
pub mod types;
