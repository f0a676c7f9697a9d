pub mod clock;
pub mod config;
pub mod error;
pub mod timestamp;
mod scheduler;

#[cfg(test)]
mod tests;

pub use clock::{Decision, ReplayClock, SkipReason, TimeOfDay, scaled_delay};
pub use config::{CancelPolicy, ReplayConfig};
pub use error::SchedulerError;
pub use scheduler::{PumpState, ReplayOutcome, ReplayStats, Scheduler};
pub use timestamp::parse_timestamp;
