pub mod detector;
pub mod event_log;

pub use event_log::EventLog;
pub use detector::{CollisionParticipant, DetectorConfig, EventDetector};

use std::{fmt, time::Instant};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    Overtake,
    Stopped,
    Collision,
}

impl EventKind {
    /// Reporting rank, lower goes first. Kinds without a rank are reported after every ranked
    /// kind.
    pub fn priority(self) -> Option<u8> {
        match self {
            Self::Stopped => Some(0),
            Self::Overtake => Some(1),
            Self::Collision => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overtake => "overtake",
            Self::Stopped => "stopped",
            Self::Collision => "collision",
        };
        f.write_str(name)
    }
}

/// Something the detector noticed during a tick, before it is logged.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub kind: EventKind,
    pub description: String,
    /// Car number the camera should follow
    pub focus: Option<u32>,
    /// Lap percent of the focused car when detected
    pub lap_percent: Option<f32>,
}

/// A logged event waiting to be reported.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: u64,
    pub created_at: Instant,
    pub kind: EventKind,
    pub description: String,
    pub focus: Option<u32>,
    pub lap_percent: Option<f32>,
}
