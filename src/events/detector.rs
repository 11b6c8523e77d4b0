use std::time::{Duration, Instant};

use itertools::Itertools;
use log::debug;

use crate::race::{Driver, DriverSnapshot, RacePhase};

use super::{Detection, EventKind};

/// Below this distance per tick a car counts as stopped
const STOPPED_DISTANCE_M: f64 = 1.;
const STOPPED_COOLDOWN_S: u64 = 10;
/// Incident points that mark a car as involved in contact
const COLLISION_INCIDENT_DELTA: i32 = 4;
/// Cars involved within this fraction of a lap belong to the same incident
const COLLISION_LAP_TOLERANCE: f32 = 0.02;

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub stopped_distance_m: f64,
    pub stopped_cooldown: Duration,
    pub collision_incident_delta: i32,
    pub collision_lap_tolerance: f32,
    /// Turn multi-car collision clusters into events. Clusters are always detected and logged.
    pub report_collisions: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            stopped_distance_m: STOPPED_DISTANCE_M,
            stopped_cooldown: Duration::from_secs(STOPPED_COOLDOWN_S),
            collision_incident_delta: COLLISION_INCIDENT_DELTA,
            collision_lap_tolerance: COLLISION_LAP_TOLERANCE,
            report_collisions: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollisionParticipant {
    pub car_number: u32,
    pub name: String,
    pub lap_percent: f32,
}

/// Compares consecutive driver snapshots and reports what changed.
///
/// The detector keeps no state of its own: the stopped-car cooldown lives on each driver's
/// `last_stopped` stamp, which the caller sets for every stopped detection it accepts.
pub struct EventDetector {
    config: DetectorConfig,
}

impl EventDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn detect(
        &self,
        current: &DriverSnapshot,
        previous: &DriverSnapshot,
        phase: &RacePhase,
        now: Instant,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();

        if phase.started {
            let clusters = self.collision_clusters(current, previous);
            if !clusters.is_empty() {
                debug!("Incident clusters this tick: {:?}", clusters);
            }
            if self.config.report_collisions {
                detections.extend(
                    clusters
                        .iter()
                        .filter(|cluster| cluster.len() >= 2)
                        .map(|cluster| collision_detection(cluster)),
                );
            }
        }

        detections.extend(self.detect_overtake(current, previous));

        if phase.started && phase.all_cars_started {
            detections.extend(self.detect_stopped(current, previous, now));
        }
        detections
    }

    /// The first legitimate position gain this tick, scanning from the front of the field.
    pub fn detect_overtake(
        &self,
        current: &DriverSnapshot,
        previous: &DriverSnapshot,
    ) -> Option<Detection> {
        for driver in current.iter() {
            let Some(prev) = previous.by_car_idx(driver.car_idx) else {
                continue;
            };
            if driver.position >= prev.position {
                continue;
            }
            let Some(overtaken) = current.at_position(driver.position + 1) else {
                continue;
            };
            if !is_racing(driver) || !is_racing(overtaken) {
                continue;
            }

            return Some(Detection {
                kind: EventKind::Overtake,
                description: format!(
                    "{} overtook {} for P{}",
                    driver.display_name(),
                    overtaken.display_name(),
                    driver.position
                ),
                focus: Some(driver.car_number),
                lap_percent: Some(driver.lap_percent),
            });
        }
        None
    }

    /// Cars that covered less than the stopped distance since the previous tick and are not
    /// cooling down from an earlier stop.
    pub fn detect_stopped(
        &self,
        current: &DriverSnapshot,
        previous: &DriverSnapshot,
        now: Instant,
    ) -> Vec<Detection> {
        current
            .iter()
            .filter(|driver| {
                let Some(prev) = previous.by_car_idx(driver.car_idx) else {
                    return false;
                };
                let moved = driver.total_distance_m - prev.total_distance_m;
                if moved.abs() >= self.config.stopped_distance_m {
                    return false;
                }
                if driver.in_pits || driver.is_dnf() || !driver.on_track {
                    return false;
                }
                !driver.last_stopped.is_some_and(|stopped| {
                    now.saturating_duration_since(stopped) < self.config.stopped_cooldown
                })
            })
            .map(|driver| Detection {
                kind: EventKind::Stopped,
                description: format!(
                    "{} has stopped on track in P{}",
                    driver.display_name(),
                    driver.position
                ),
                focus: Some(driver.car_number),
                lap_percent: Some(driver.lap_percent),
            })
            .collect()
    }

    /// Cars whose incident count jumped since the previous tick, grouped by where they are on the
    /// lap. Each cluster is one incident; single-car clusters are included.
    pub fn collision_clusters(
        &self,
        current: &DriverSnapshot,
        previous: &DriverSnapshot,
    ) -> Vec<Vec<CollisionParticipant>> {
        let involved = current
            .iter()
            .filter(|driver| {
                previous.by_car_idx(driver.car_idx).is_some_and(|prev| {
                    driver.incidents - prev.incidents >= self.config.collision_incident_delta
                })
            })
            .map(|driver| CollisionParticipant {
                car_number: driver.car_number,
                name: driver.display_name(),
                lap_percent: driver.lap_percent,
            })
            .sorted_by(|a, b| a.lap_percent.total_cmp(&b.lap_percent));

        let mut clusters: Vec<Vec<CollisionParticipant>> = Vec::new();
        for participant in involved {
            match clusters.last_mut() {
                Some(cluster)
                    if cluster.last().is_some_and(|last| {
                        participant.lap_percent - last.lap_percent
                            < self.config.collision_lap_tolerance
                    }) =>
                {
                    cluster.push(participant)
                }
                _ => clusters.push(vec![participant]),
            }
        }
        clusters
    }
}

/// On track, out of the pits and still classified.
fn is_racing(driver: &Driver) -> bool {
    !driver.in_pits && !driver.is_dnf() && driver.lap_percent != 0.
}

fn collision_detection(cluster: &[CollisionParticipant]) -> Detection {
    let names = cluster.iter().map(|participant| participant.name.as_str()).join(", ");
    Detection {
        kind: EventKind::Collision,
        description: format!("{names} collided"),
        focus: None,
        lap_percent: None,
    }
}
