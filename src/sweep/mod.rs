//! Background sweeps: expiry reaping, directory reclamation, admin purge.

pub mod purge;
pub mod reaper;
pub mod reclaimer;

pub use purge::{PurgeReport, Purger};
pub use reaper::{ExpiryReaper, SweepReport};
pub use reclaimer::{DirectoryReclaimer, ReclaimReport};
