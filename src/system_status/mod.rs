//! System pressure sampling and the overload verdicts derived from it.

mod snapshotter;
mod status;

pub use snapshotter::{Snapshot, Snapshotter, SnapshotterOptions};
pub use status::SystemStatus;
