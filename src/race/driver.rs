use std::{ops::Deref, sync::Arc, time::Instant};

/// One competitor's race state at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Driver {
    pub car_idx: usize,
    pub car_number: u32,
    pub name: String,
    pub car_name: String,
    pub license: String,
    pub rating: i32,
    pub grid_position: u32,

    pub laps_started: i32,
    /// Negative once the car retired
    pub laps_completed: i32,
    /// Fraction of the current lap, negative when the car is not in the world
    pub lap_percent: f32,
    pub lap_distance_m: f64,
    pub total_distance_m: f64,
    pub current_lap_time_s: Option<f64>,
    pub lap_times_s: Vec<f32>,
    pub fastest_lap_s: Option<f32>,
    pub last_lap_s: Option<f32>,

    /// 1 is the leader
    pub position: u32,
    pub gap_to_leader_s: Option<f32>,
    pub in_pits: bool,
    pub on_track: bool,
    pub incidents: i32,
    pub last_stopped: Option<Instant>,
}

impl Driver {
    pub fn new(car_idx: usize, car_number: u32, name: &str, grid_position: u32) -> Self {
        Self {
            car_idx,
            car_number,
            name: name.to_string(),
            car_name: String::new(),
            license: String::new(),
            rating: 0,
            grid_position,
            laps_started: 0,
            laps_completed: 0,
            lap_percent: 0.,
            lap_distance_m: 0.,
            total_distance_m: 0.,
            current_lap_time_s: None,
            lap_times_s: Vec::new(),
            fastest_lap_s: None,
            last_lap_s: None,
            position: grid_position,
            gap_to_leader_s: None,
            in_pits: false,
            on_track: false,
            incidents: 0,
            last_stopped: None,
        }
    }

    /// Laps completed plus the fraction of the current lap.
    pub fn progress(&self) -> f64 {
        f64::from(self.laps_completed) + f64::from(self.lap_percent)
    }

    pub fn is_dnf(&self) -> bool {
        self.laps_completed < 0
    }

    /// Driver name with digits removed, as commentators read it.
    pub fn display_name(&self) -> String {
        let name: String = self
            .name
            .chars()
            .filter(|c| !c.is_ascii_digit())
            .collect();
        name.trim().to_string()
    }
}

/// Immutable copy of the driver set, cheap to clone and share between threads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DriverSnapshot(Arc<[Driver]>);

impl DriverSnapshot {
    pub fn by_car_idx(&self, car_idx: usize) -> Option<&Driver> {
        self.0.iter().find(|driver| driver.car_idx == car_idx)
    }

    pub fn by_car_number(&self, car_number: u32) -> Option<&Driver> {
        self.0.iter().find(|driver| driver.car_number == car_number)
    }

    pub fn at_position(&self, position: u32) -> Option<&Driver> {
        self.0.iter().find(|driver| driver.position == position)
    }
}

impl From<Vec<Driver>> for DriverSnapshot {
    fn from(drivers: Vec<Driver>) -> Self {
        Self(drivers.into())
    }
}

impl Deref for DriverSnapshot {
    type Target = [Driver];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
