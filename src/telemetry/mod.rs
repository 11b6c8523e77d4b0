pub(crate) mod collector;
pub mod producer;
pub mod replay;
pub mod writer;

pub use collector::record_session;
#[cfg(windows)]
pub use producer::IRacingFeed;
pub use producer::{FeedCommand, ScriptedFeed, TelemetryFeed};
pub use replay::ReplayFeed;

use serde::{Deserialize, Serialize};
use uom::si::{
    f64::Length,
    length::{foot, kilometer, meter, mile},
};

use crate::CasterError;

/// Replay speed that freezes playback.
pub const REPLAY_SPEED_PAUSED: i32 = 0;
/// Replay speed matching the simulator's own clock.
pub const REPLAY_SPEED_REALTIME: i32 = 1;

/// Where a car currently is relative to the racing surface, as reported by the simulator.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackSurface {
    #[default]
    NotInWorld,
    OffTrack,
    InPitStall,
    ApproachingPits,
    OnTrack,
}

impl TrackSurface {
    /// Maps the iRacing `irsdk_TrkLoc` value.
    pub fn from_irsdk(value: i32) -> Self {
        match value {
            0 => Self::OffTrack,
            1 => Self::InPitStall,
            2 => Self::ApproachingPits,
            3 => Self::OnTrack,
            _ => Self::NotInWorld,
        }
    }

    /// Pit road or pit stall. More reliable than the simulator's on-pit-road flag, which
    /// drops out while a car is stationary in its box.
    pub fn is_pit_road(self) -> bool {
        matches!(self, Self::InPitStall | Self::ApproachingPits)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RosterEntry {
    pub car_idx: usize,
    pub car_number: u32,
    /// Empty when the slot belongs to a driver who disconnected
    pub user_name: String,
    pub car_name: String,
    pub license: String,
    pub rating: i32,
    pub is_pace_car: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QualifyingResult {
    pub car_idx: usize,
    /// 1-based qualifying position
    pub position: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CameraGroup {
    pub number: i32,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub track_name: String,
    /// Track length as the simulator prints it, e.g. `5.20 km`
    pub track_length: String,
    pub roster: Vec<RosterEntry>,
    pub qualifying: Vec<QualifyingResult>,
    pub camera_groups: Vec<CameraGroup>,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            track_name: "Unknown".to_string(),
            track_length: "0.0 km".to_string(),
            roster: Vec::new(),
            qualifying: Vec::new(),
            camera_groups: Vec::new(),
        }
    }
}

impl SessionInfo {
    pub fn track_length_m(&self) -> Option<f64> {
        parse_track_length(&self.track_length)
    }

    pub fn grid_position(&self, car_idx: usize) -> Option<u32> {
        self.qualifying
            .iter()
            .find(|result| result.car_idx == car_idx)
            .map(|result| result.position)
    }
}

/// Parses a length such as `5.20 km`, `3.1 mi` or `4200 m` into meters.
pub fn parse_track_length(raw: &str) -> Option<f64> {
    let mut parts = raw.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let length = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("km") => Length::new::<kilometer>(value),
        Some("mi") => Length::new::<mile>(value),
        Some("ft") => Length::new::<foot>(value),
        Some("m") | None => Length::new::<meter>(value),
        Some(_) => return None,
    };
    let meters = length.get::<meter>();
    (meters.is_finite() && meters >= 0.).then_some(meters)
}

/// One poll of the simulator. Per-car arrays are indexed by car index; a field that could not be
/// read this tick is `None`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedTick {
    pub tick_no: usize,
    /// Session clock in seconds
    pub session_time_s: Option<f64>,
    /// Race laps completed by the leader, 0 until the first lap is done
    pub race_laps: Option<i32>,
    pub car_idx_position: Option<Vec<i32>>,
    /// Laps started
    pub car_idx_lap: Option<Vec<i32>>,
    /// Laps completed, negative for cars that retired
    pub car_idx_lap_completed: Option<Vec<i32>>,
    /// Fraction of the current lap, negative when the car is not in the world
    pub car_idx_lap_dist_pct: Option<Vec<f32>>,
    pub car_idx_last_lap_time: Option<Vec<f32>>,
    /// Time gap to the leader
    pub car_idx_f2_time: Option<Vec<f32>>,
    pub car_idx_track_surface: Option<Vec<TrackSurface>>,
    pub car_idx_incidents: Option<Vec<i32>>,
}

impl FeedTick {
    /// Whether the tick carries the lap fields car distances are computed from.
    pub fn has_distances(&self) -> bool {
        self.car_idx_lap_dist_pct.is_some() && self.car_idx_lap_completed.is_some()
    }

    /// Number of car slots reported this tick.
    pub fn car_count(&self) -> usize {
        [
            self.car_idx_position.as_ref().map(Vec::len),
            self.car_idx_lap_dist_pct.as_ref().map(Vec::len),
            self.car_idx_lap_completed.as_ref().map(Vec::len),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }
}

/// Reads `car_idx` from a per-car field.
pub fn car_value<T: Copy>(
    field: &Option<Vec<T>>,
    name: &str,
    car_idx: usize,
) -> Result<T, CasterError> {
    field
        .as_ref()
        .and_then(|values| values.get(car_idx).copied())
        .ok_or_else(|| CasterError::TransientReadFailure {
            field: format!("{name}[{car_idx}]"),
        })
}

/// A line of a recorded session file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum FeedRecord {
    Session(SessionInfo),
    Tick(Box<FeedTick>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_length_units() {
        let km = parse_track_length("5.20 km").unwrap();
        assert!((km - 5200.).abs() < 1e-6);
        assert_eq!(parse_track_length("4200 m"), Some(4200.));
        assert_eq!(parse_track_length("4200"), Some(4200.));
        let miles = parse_track_length("2.5 mi").unwrap();
        assert!((miles - 4023.36).abs() < 0.01);
        assert_eq!(parse_track_length("fast km"), None);
        assert_eq!(parse_track_length("3 parsecs"), None);
        assert_eq!(parse_track_length(""), None);
    }

    #[test]
    fn test_surface_pit_road() {
        assert!(TrackSurface::from_irsdk(1).is_pit_road());
        assert!(TrackSurface::from_irsdk(2).is_pit_road());
        assert!(!TrackSurface::from_irsdk(3).is_pit_road());
        assert_eq!(TrackSurface::from_irsdk(-1), TrackSurface::NotInWorld);
    }

    #[test]
    fn test_car_value_reports_missing_field() {
        let tick = FeedTick {
            car_idx_lap: Some(vec![0, 3]),
            ..FeedTick::default()
        };
        assert_eq!(car_value(&tick.car_idx_lap, "CarIdxLap", 1).unwrap(), 3);
        assert!(matches!(
            car_value(&tick.car_idx_lap, "CarIdxLap", 5),
            Err(CasterError::TransientReadFailure { .. })
        ));
        assert!(car_value(&tick.car_idx_position, "CarIdxPosition", 0).is_err());
        assert_eq!(tick.car_count(), 0);
    }
}
