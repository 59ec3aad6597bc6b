//! pmrotate Logs - Rotation decisions, rotate-and-truncate, and retention

mod discovery;
mod naming;
mod retention;
mod rotation;
mod watched;

pub use discovery::{plan, Discovery};
pub use naming::{archive_path, archive_prefix, archive_timestamp};
pub use retention::prune;
pub use rotation::{should_rotate, RotationOutcome, Rotator};
pub use watched::{InFlight, InFlightGuard, WatchedFiles};
