use super::Driver;

/// Progress window of a car still rolling up to the start line when the green flag drops.
const GRIDDED_BEHIND_LINE: (f64, f64) = (0.8, 1.0);

/// Race-wide progress flags. Both flags only ever move from false to true.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RacePhase {
    pub started: bool,
    /// Session clock when the first race lap was completed
    pub start_time_s: Option<f64>,
    /// Seconds since `start_time_s`
    pub elapsed_s: f64,
    pub all_cars_started: bool,
}

impl RacePhase {
    /// Feed the session clock and race lap counter of a tick. Returns true on the tick the race
    /// starts.
    pub fn observe_clock(&mut self, race_laps: i32, session_time_s: f64) -> bool {
        if !self.started {
            if race_laps > 0 {
                self.started = true;
                self.start_time_s = Some(session_time_s);
                self.elapsed_s = 0.;
                return true;
            }
        } else if let Some(start) = self.start_time_s {
            self.elapsed_s = (session_time_s - start).max(0.);
        }
        false
    }

    /// Re-evaluate whether the whole field is underway. Returns true on the call that opens the
    /// gate.
    pub fn update_all_cars_started(&mut self, drivers: &[Driver], grace_s: f64) -> bool {
        if self.all_cars_started || !self.started {
            return false;
        }
        self.all_cars_started = all_cars_underway(drivers, self.elapsed_s, grace_s);
        self.all_cars_started
    }
}

/// Whether the field has cleared the start. Within `grace_s` of the start a car that has not
/// moved, or is still short of the line, holds the gate closed; after that the gate opens
/// regardless.
pub fn all_cars_underway(drivers: &[Driver], elapsed_s: f64, grace_s: f64) -> bool {
    if drivers.is_empty() {
        return false;
    }
    if elapsed_s > grace_s {
        return true;
    }
    drivers.iter().all(|driver| {
        let progress = driver.progress();
        let behind_line =
            progress > GRIDDED_BEHIND_LINE.0 && progress < GRIDDED_BEHIND_LINE.1;
        progress != 0. && !behind_line
    })
}
