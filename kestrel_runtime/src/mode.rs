//! Robot modes: the user-facing lifecycle contract, the per-mode handler
//! table and the scheduler that drives transitions.

pub mod robot_mode;
pub mod scheduler;
pub mod table;

pub use robot_mode::{ModeError, ModeHandle, NoopMode, RobotMode, mode_handle};
pub use scheduler::{FailurePolicy, Hook, ModeScheduler, SchedulerError, StepOutcome};
pub use table::ModeTable;
