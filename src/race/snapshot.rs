use std::{cmp::Ordering, collections::HashMap, time::Instant};

use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    CasterError,
    telemetry::{FeedTick, SessionInfo, TelemetryFeed, TrackSurface, car_value},
};

use super::{Driver, DriverSnapshot};

/// Owns the driver set of a monitored session and keeps it in step with the telemetry feed.
pub struct SnapshotBuilder {
    session: SessionInfo,
    track_length_m: f64,
    drivers: Vec<Driver>,
    /// Session clock at which each car started its current lap
    lap_started_at: HashMap<usize, f64>,
}

impl SnapshotBuilder {
    /// Build the initial driver set from the session roster and qualifying results, ordered by
    /// grid position.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryUnavailable` if the feed is not connected.
    pub fn initialize(feed: &mut impl TelemetryFeed) -> Result<Self, CasterError> {
        if !feed.is_connected() {
            return Err(CasterError::TelemetryUnavailable {
                reason: "telemetry feed is not connected".to_string(),
            });
        }
        let session = feed.session_info()?;
        Ok(Self::from_session(session))
    }

    pub fn from_session(session: SessionInfo) -> Self {
        let track_length_m = session.track_length_m().unwrap_or_else(|| {
            warn!(
                "Could not parse track length '{}', distances will read as zero",
                session.track_length
            );
            0.
        });

        let entrants = session
            .roster
            .iter()
            .filter(|entry| !entry.is_pace_car && !entry.user_name.is_empty())
            .collect_vec();
        // cars without a qualifying result line up behind the qualified field in roster order
        let mut unqualified = session
            .qualifying
            .iter()
            .map(|result| result.position)
            .max()
            .unwrap_or(0);

        let mut drivers = entrants
            .into_iter()
            .map(|entry| {
                let grid_position = session.grid_position(entry.car_idx).unwrap_or_else(|| {
                    unqualified += 1;
                    unqualified
                });
                Driver {
                    car_name: entry.car_name.clone(),
                    license: entry.license.clone(),
                    rating: entry.rating,
                    ..Driver::new(
                        entry.car_idx,
                        entry.car_number,
                        &entry.user_name,
                        grid_position,
                    )
                }
            })
            .collect_vec();
        rank_drivers(&mut drivers, false);

        info!(
            "Tracking {} drivers at {} ({:.0} m)",
            drivers.len(),
            session.track_name,
            track_length_m
        );

        Self {
            session,
            track_length_m,
            drivers,
            lap_started_at: HashMap::new(),
        }
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn track_length_m(&self) -> f64 {
        self.track_length_m
    }

    /// Update every driver from `tick` and re-rank the field: by progress once the race has
    /// started, by grid position before.
    ///
    /// Car slots without a tracked driver (pace car, disconnected or empty slots) are ignored. A
    /// field that is missing from the tick leaves the matching driver fields as they were.
    ///
    /// Returns the car indices whose distance could not be read from this tick.
    pub fn refresh(&mut self, tick: &FeedTick, race_started: bool) -> Vec<usize> {
        let mut missing_fields = 0;
        let mut stale = Vec::new();
        for driver in self.drivers.iter_mut() {
            let idx = driver.car_idx;
            if idx >= tick.car_count() {
                stale.push(idx);
                continue;
            }

            let lap_percent = car_value(&tick.car_idx_lap_dist_pct, "CarIdxLapDistPct", idx);
            let laps_completed =
                car_value(&tick.car_idx_lap_completed, "CarIdxLapCompleted", idx);
            if lap_percent.is_err() || laps_completed.is_err() {
                stale.push(idx);
            }

            match lap_percent {
                Ok(lap_percent) => driver.lap_percent = lap_percent,
                Err(_) => missing_fields += 1,
            }
            match car_value(&tick.car_idx_lap, "CarIdxLap", idx) {
                Ok(laps_started) => {
                    if laps_started != driver.laps_started
                        || !self.lap_started_at.contains_key(&idx)
                    {
                        if let Some(clock) = tick.session_time_s {
                            self.lap_started_at.insert(idx, clock);
                        }
                    }
                    driver.laps_started = laps_started;
                }
                Err(_) => missing_fields += 1,
            }
            match laps_completed {
                Ok(laps_completed) => driver.laps_completed = laps_completed,
                Err(_) => missing_fields += 1,
            }
            match car_value(&tick.car_idx_last_lap_time, "CarIdxLastLapTime", idx) {
                Ok(lap_time) => record_lap_time(driver, lap_time),
                Err(_) => missing_fields += 1,
            }
            match car_value(&tick.car_idx_f2_time, "CarIdxF2Time", idx) {
                Ok(gap) => driver.gap_to_leader_s = Some(gap),
                Err(_) => missing_fields += 1,
            }
            let surface = car_value(&tick.car_idx_track_surface, "CarIdxTrackSurface", idx);
            match surface {
                Ok(surface) => driver.in_pits = surface.is_pit_road(),
                Err(_) => missing_fields += 1,
            }
            match car_value(&tick.car_idx_incidents, "CarIdxIncidents", idx) {
                Ok(incidents) => driver.incidents = incidents,
                Err(_) => missing_fields += 1,
            }

            driver.on_track = driver.lap_percent > 0.
                && !matches!(surface, Ok(TrackSurface::NotInWorld));
            driver.lap_distance_m = f64::from(driver.lap_percent.max(0.)) * self.track_length_m;
            driver.total_distance_m =
                f64::from(driver.laps_completed.max(0)) * self.track_length_m
                    + driver.lap_distance_m;
            driver.current_lap_time_s = tick
                .session_time_s
                .zip(self.lap_started_at.get(&idx))
                .map(|(clock, started)| (clock - started).max(0.));
        }
        if missing_fields > 0 {
            debug!(
                "Tick {} was missing {} driver fields",
                tick.tick_no, missing_fields
            );
        }

        rank_drivers(&mut self.drivers, race_started);
        stale
    }

    /// Stamp `car_idx` as flagged stopped at `at`. The stamp survives later refreshes.
    pub fn mark_stopped(&mut self, car_idx: usize, at: Instant) {
        if let Some(driver) = self
            .drivers
            .iter_mut()
            .find(|driver| driver.car_idx == car_idx)
        {
            driver.last_stopped = Some(at);
        }
    }

    pub fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot::from(self.drivers.clone())
    }
}

/// Zero and negative lap times are placeholders for laps that were never timed.
fn record_lap_time(driver: &mut Driver, lap_time: f32) {
    if lap_time <= 0. || driver.last_lap_s == Some(lap_time) {
        return;
    }
    driver.last_lap_s = Some(lap_time);
    driver.lap_times_s.push(lap_time);
    driver.fastest_lap_s = Some(match driver.fastest_lap_s {
        Some(fastest) => fastest.min(lap_time),
        None => lap_time,
    });
}

/// Sort the field and renumber positions 1..N. Ties keep their previous order.
fn rank_drivers(drivers: &mut [Driver], race_started: bool) {
    if race_started {
        drivers.sort_by(|a, b| b.progress().total_cmp(&a.progress()));
    } else {
        drivers.sort_by(|a, b| match a.grid_position.cmp(&b.grid_position) {
            Ordering::Equal => a.car_idx.cmp(&b.car_idx),
            other => other,
        });
    }
    for (i, driver) in drivers.iter_mut().enumerate() {
        driver.position = i as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{QualifyingResult, RosterEntry, ScriptedFeed};
    use proptest::prelude::*;

    fn roster_entry(car_idx: usize, car_number: u32, user_name: &str) -> RosterEntry {
        RosterEntry {
            car_idx,
            car_number,
            user_name: user_name.to_string(),
            car_name: "MX-5".to_string(),
            license: "A 4.99".to_string(),
            rating: 2500,
            is_pace_car: false,
        }
    }

    fn session() -> SessionInfo {
        SessionInfo {
            track_name: "Okayama".to_string(),
            track_length: "3.70 km".to_string(),
            roster: vec![
                RosterEntry {
                    is_pace_car: true,
                    ..roster_entry(0, 0, "Pace Car")
                },
                roster_entry(1, 11, "Alice"),
                roster_entry(2, 22, "Bob"),
                roster_entry(3, 33, "Carla"),
                roster_entry(4, 44, ""),
            ],
            qualifying: vec![
                QualifyingResult {
                    car_idx: 1,
                    position: 3,
                },
                QualifyingResult {
                    car_idx: 2,
                    position: 1,
                },
                QualifyingResult {
                    car_idx: 3,
                    position: 2,
                },
            ],
            ..SessionInfo::default()
        }
    }

    fn tick(
        laps_completed: [i32; 5],
        lap_dist_pct: [f32; 5],
        last_lap_time: [f32; 5],
        surface: [TrackSurface; 5],
    ) -> FeedTick {
        FeedTick {
            tick_no: 1,
            session_time_s: Some(600.),
            race_laps: Some(1),
            car_idx_position: Some(vec![0, 1, 2, 3, 0]),
            car_idx_lap: Some(laps_completed.iter().map(|laps| laps + 1).collect()),
            car_idx_lap_completed: Some(laps_completed.to_vec()),
            car_idx_lap_dist_pct: Some(lap_dist_pct.to_vec()),
            car_idx_last_lap_time: Some(last_lap_time.to_vec()),
            car_idx_f2_time: Some(vec![0.; 5]),
            car_idx_track_surface: Some(surface.to_vec()),
            car_idx_incidents: Some(vec![0; 5]),
        }
    }

    const ON_TRACK: [TrackSurface; 5] = [TrackSurface::OnTrack; 5];

    #[test]
    fn test_initialize_requires_connection() {
        let mut feed = ScriptedFeed::new(session(), Vec::new());
        assert!(matches!(
            SnapshotBuilder::initialize(&mut feed),
            Err(CasterError::TelemetryUnavailable { .. })
        ));
    }

    #[test]
    fn test_initialize_orders_by_grid_and_skips_pace_car() {
        let mut feed = ScriptedFeed::new(session(), Vec::new());
        feed.connect().unwrap();
        let builder = SnapshotBuilder::initialize(&mut feed).unwrap();
        let snapshot = builder.snapshot();

        let names = snapshot.iter().map(|d| d.name.as_str()).collect_vec();
        assert_eq!(names, vec!["Bob", "Carla", "Alice"]);
        let positions = snapshot.iter().map(|d| d.position).collect_vec();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!((builder.track_length_m() - 3700.).abs() < 1e-6);
    }

    #[test]
    fn test_unqualified_cars_start_behind_the_field() {
        let mut session = session();
        session.roster.push(roster_entry(5, 55, "Dino"));
        let builder = SnapshotBuilder::from_session(session);
        let dino = builder.snapshot().by_car_idx(5).cloned().unwrap();
        assert_eq!(dino.grid_position, 4);
        assert_eq!(dino.position, 4);
    }

    #[test]
    fn test_refresh_ranks_by_progress_after_start() {
        let mut builder = SnapshotBuilder::from_session(session());
        let tick = tick(
            [0, 2, 2, 3, 0],
            [0., 0.5, 0.7, 0.1, 0.],
            [0.; 5],
            ON_TRACK,
        );

        builder.refresh(&tick, false);
        let names = builder.snapshot().iter().map(|d| d.name.clone()).collect_vec();
        assert_eq!(names, vec!["Bob", "Carla", "Alice"]);

        builder.refresh(&tick, true);
        let snapshot = builder.snapshot();
        let names = snapshot.iter().map(|d| d.name.as_str()).collect_vec();
        assert_eq!(names, vec!["Carla", "Bob", "Alice"]);
        assert_eq!(snapshot.at_position(1).unwrap().car_number, 33);

        let bob = snapshot.by_car_idx(2).unwrap();
        assert!((bob.lap_distance_m - 0.7 * 3700.).abs() < 0.01);
        assert!((bob.total_distance_m - (2. * 3700. + 0.7 * 3700.)).abs() < 0.01);
        assert!(bob.on_track);
    }

    #[test]
    fn test_invalid_lap_times_are_ignored() {
        let mut builder = SnapshotBuilder::from_session(session());
        builder.refresh(
            &tick([0; 5], [0.1; 5], [0., 92.5, -1., 0., 0.], ON_TRACK),
            true,
        );
        builder.refresh(
            &tick([0; 5], [0.2; 5], [0., 91.0, 0., 0., 0.], ON_TRACK),
            true,
        );
        builder.refresh(
            &tick([0; 5], [0.3; 5], [0., -1., 0., 0., 0.], ON_TRACK),
            true,
        );

        let snapshot = builder.snapshot();
        let alice = snapshot.by_car_idx(1).unwrap();
        assert_eq!(alice.last_lap_s, Some(91.0));
        assert_eq!(alice.fastest_lap_s, Some(91.0));
        assert_eq!(alice.lap_times_s, vec![92.5, 91.0]);

        let bob = snapshot.by_car_idx(2).unwrap();
        assert_eq!(bob.last_lap_s, None);
        assert!(bob.lap_times_s.is_empty());
    }

    #[test]
    fn test_pit_road_comes_from_surface() {
        let mut builder = SnapshotBuilder::from_session(session());
        let mut surface = ON_TRACK;
        surface[1] = TrackSurface::InPitStall;
        surface[2] = TrackSurface::ApproachingPits;
        surface[3] = TrackSurface::NotInWorld;
        builder.refresh(&tick([1; 5], [0.4; 5], [0.; 5], surface), true);

        let snapshot = builder.snapshot();
        assert!(snapshot.by_car_idx(1).unwrap().in_pits);
        assert!(snapshot.by_car_idx(2).unwrap().in_pits);
        let carla = snapshot.by_car_idx(3).unwrap();
        assert!(!carla.in_pits);
        assert!(!carla.on_track);
    }

    #[test]
    fn test_missing_fields_keep_previous_values() {
        let mut builder = SnapshotBuilder::from_session(session());
        builder.refresh(
            &tick([2; 5], [0.4, 0.4, 0.6, 0.2, 0.], [0.; 5], ON_TRACK),
            true,
        );
        let partial = FeedTick {
            car_idx_lap_dist_pct: None,
            car_idx_track_surface: Some(vec![TrackSurface::OnTrack; 2]),
            ..tick([2; 5], [0.; 5], [0.; 5], ON_TRACK)
        };
        builder.refresh(&partial, true);

        let snapshot = builder.snapshot();
        assert!((snapshot.by_car_idx(2).unwrap().lap_percent - 0.6).abs() < 1e-6);
        assert_eq!(snapshot.at_position(1).unwrap().name, "Bob");
        let positions = snapshot.iter().map(|d| d.position).sorted().collect_vec();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_refresh_reports_cars_without_distance() {
        let mut builder = SnapshotBuilder::from_session(session());
        let full = tick([2; 5], [0.4, 0.4, 0.6, 0.2, 0.], [0.; 5], ON_TRACK);
        assert!(builder.refresh(&full, true).is_empty());

        let no_laps = FeedTick {
            car_idx_lap_completed: None,
            ..full.clone()
        };
        let stale = builder.refresh(&no_laps, true);
        assert_eq!(stale.into_iter().sorted().collect_vec(), vec![1, 2, 3]);

        let short = FeedTick {
            car_idx_lap_dist_pct: Some(vec![0.5; 3]),
            ..full
        };
        assert_eq!(builder.refresh(&short, true), vec![3]);
        assert!((builder.snapshot().by_car_idx(3).unwrap().lap_percent - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_current_lap_time_follows_session_clock() {
        let mut builder = SnapshotBuilder::from_session(session());
        let mut first = tick([1; 5], [0.1; 5], [0.; 5], ON_TRACK);
        first.session_time_s = Some(100.);
        builder.refresh(&first, true);

        let mut later = first.clone();
        later.session_time_s = Some(130.);
        builder.refresh(&later, true);
        let lap_time = builder.snapshot().by_car_idx(1).unwrap().current_lap_time_s;
        assert_eq!(lap_time, Some(30.));

        let mut next_lap = later.clone();
        next_lap.session_time_s = Some(190.);
        next_lap.car_idx_lap = Some(vec![3; 5]);
        builder.refresh(&next_lap, true);
        let lap_time = builder.snapshot().by_car_idx(1).unwrap().current_lap_time_s;
        assert_eq!(lap_time, Some(0.));
    }

    #[test]
    fn test_stopped_mark_survives_refresh() {
        let mut builder = SnapshotBuilder::from_session(session());
        let at = Instant::now();
        builder.mark_stopped(3, at);
        builder.refresh(&tick([1; 5], [0.5; 5], [0.; 5], ON_TRACK), true);
        assert_eq!(builder.snapshot().by_car_idx(3).unwrap().last_stopped, Some(at));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_positions_are_dense(
            laps in proptest::collection::vec(-1i32..30, 5),
            pcts in proptest::collection::vec(0f32..1., 5),
            race_started in any::<bool>(),
        ) {
            let mut builder = SnapshotBuilder::from_session(session());
            let tick = FeedTick {
                car_idx_position: Some(vec![1; 5]),
                car_idx_lap_completed: Some(laps),
                car_idx_lap_dist_pct: Some(pcts),
                ..FeedTick::default()
            };
            builder.refresh(&tick, race_started);

            let snapshot = builder.snapshot();
            let positions = snapshot.iter().map(|d| d.position).sorted().collect_vec();
            prop_assert_eq!(positions, (1..=snapshot.len() as u32).collect_vec());
            if race_started {
                for pair in snapshot.windows(2) {
                    prop_assert!(pair[0].progress() >= pair[1].progress());
                }
            }
        }
    }
}
