pub mod driver;
pub mod phase;
pub mod snapshot;

pub use driver::{Driver, DriverSnapshot};
pub use phase::{RacePhase, all_cars_underway};
pub use snapshot::SnapshotBuilder;
