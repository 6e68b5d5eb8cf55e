//! Clock sync and synchronised start
//!
//! - [`scheduler`]: control worker; heartbeats feed the clock estimator,
//!   starts are delayed until the conductor's target instant
//! - [`heartbeat`]: conductor-only periodic clock broadcast
//! - [`conductor`]: commands originated by the conductor

pub mod conductor;
pub mod heartbeat;
pub mod scheduler;

pub use conductor::{ConductorControls, SongBank};
pub use heartbeat::HeartbeatBroadcaster;
pub use scheduler::{SchedulerStatus, SyncScheduler};
