// Library interface for racecaster
// This allows integration tests and benchmarks to access internal modules

pub mod broadcast;
pub mod capture;
pub mod config;
pub mod director;
pub mod errors;
pub mod events;
pub mod race;
pub mod telemetry;

// Re-export commonly used types
pub use broadcast::{CameraClient, CommentaryRequest, CommentaryService};
pub use config::DirectorConfig;
pub use director::{DirectorState, RaceDirector};
pub use errors::CasterError;
pub use events::{Event, EventDetector, EventKind, EventLog};
pub use race::{Driver, DriverSnapshot, SnapshotBuilder};
pub use telemetry::{ReplayFeed, SessionInfo, TelemetryFeed};
