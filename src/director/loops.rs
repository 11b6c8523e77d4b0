use std::{
    sync::{
        Arc, Mutex, PoisonError,
        mpsc::{self, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use rand::Rng;

use crate::{
    CasterError,
    broadcast::{CameraClient, CommentaryRequest, CommentaryService},
    events::{Event, EventDetector, EventKind},
    race::{DriverSnapshot, SnapshotBuilder},
    telemetry::{FeedTick, TelemetryFeed},
};

use super::{BROADCAST_VIEW, MessageLog, RaceSession, pre_race_focus};

/// One iteration of a polling loop.
pub(crate) trait LoopBody: Send + 'static {
    fn tick(&mut self);
}

/// A running polling loop. Dropping the stop sender wakes the loop and ends it.
pub(crate) struct LoopHandle {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LoopHandle {
    /// Ask the loop to end after its current iteration, without waiting for it.
    pub(crate) fn signal(&mut self) {
        drop(self.stop.take());
    }

    /// Signal the loop and wait for its current iteration to finish.
    pub(crate) fn stop(&mut self) {
        self.signal();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("The {} loop panicked", self.name);
            } else {
                debug!("The {} loop stopped", self.name);
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Signal every loop before waiting on any of them, so none runs another iteration while an
/// earlier one is being joined.
pub(crate) fn stop_all(loops: &mut [LoopHandle]) {
    for handle in loops.iter_mut() {
        handle.signal();
    }
    for handle in loops.iter_mut() {
        handle.stop();
    }
}

/// Run `body` on its own thread every `interval` until the returned handle is stopped.
pub(crate) fn spawn_loop(
    name: &str,
    interval: Duration,
    mut body: impl LoopBody,
) -> Result<LoopHandle, CasterError> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            loop {
                body.tick();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .map_err(|e| CasterError::LoopSpawnError {
            name: name.to_string(),
            source: e,
        })?;

    Ok(LoopHandle {
        name: name.to_string(),
        stop: Some(stop_tx),
        handle: Some(handle),
    })
}

fn read_tick<F: TelemetryFeed>(feed: &Mutex<F>) -> Result<FeedTick, CasterError> {
    feed.lock().unwrap_or_else(PoisonError::into_inner).tick()
}

/// Refreshes the driver snapshot from the feed and logs what changed since the last tick.
pub(crate) struct DetectionLoop<F: TelemetryFeed> {
    pub(crate) feed: Arc<Mutex<F>>,
    pub(crate) session: Arc<RaceSession>,
    pub(crate) builder: SnapshotBuilder,
    pub(crate) detector: EventDetector,
    pub(crate) previous: DriverSnapshot,
    pub(crate) max_event_age: Duration,
    pub(crate) last_tick_no: Option<usize>,
}

impl<F: TelemetryFeed + Send + 'static> LoopBody for DetectionLoop<F> {
    fn tick(&mut self) {
        let tick = match read_tick(&self.feed) {
            Ok(tick) => tick,
            Err(e) => {
                debug!("Detection skipped a tick: {}", e);
                return;
            }
        };

        if self.last_tick_no == Some(tick.tick_no) {
            return;
        }
        self.last_tick_no = Some(tick.tick_no);

        let phase = self.session.phase();
        let stale = self.builder.refresh(&tick, phase.started);
        let now = Instant::now();
        let mut current = self.builder.snapshot();
        let mut detections = if tick.has_distances() {
            self.detector.detect(&current, &self.previous, &phase, now)
        } else {
            debug!("Tick {} has no car distances, nothing detected", tick.tick_no);
            Vec::new()
        };
        // cars without a distance reading this tick cannot be judged stopped
        detections.retain(|d| {
            d.kind != EventKind::Stopped
                || d.focus
                    .and_then(|car_number| current.by_car_number(car_number))
                    .is_none_or(|driver| !stale.contains(&driver.car_idx))
        });

        let stopped = detections
            .iter()
            .filter(|d| d.kind == EventKind::Stopped)
            .filter_map(|d| d.focus.and_then(|car_number| current.by_car_number(car_number)))
            .map(|driver| driver.car_idx)
            .collect::<Vec<_>>();
        if !stopped.is_empty() {
            for car_idx in stopped {
                self.builder.mark_stopped(car_idx, now);
            }
            current = self.builder.snapshot();
        }

        self.session.publish_drivers(current.clone());
        self.session.with_events(|log| {
            for detection in detections {
                info!("Detected {}: {}", detection.kind, detection.description);
                log.add(detection, now);
            }
            log.expire(self.max_event_age, now);
        });
        self.previous = current;
    }
}

/// Follows the race phase, frames the grid before the start and reports logged events once the
/// field is underway.
pub(crate) struct DirectionLoop<F: TelemetryFeed> {
    pub(crate) feed: Arc<Mutex<F>>,
    pub(crate) session: Arc<RaceSession>,
    pub(crate) camera: Arc<dyn CameraClient>,
    pub(crate) commentary: Arc<dyn CommentaryService>,
    pub(crate) messages: MessageLog,
    pub(crate) color_chance: f64,
    pub(crate) max_event_age: Duration,
    pub(crate) start_grace_s: f64,
}

impl<F: TelemetryFeed> DirectionLoop<F> {
    fn report(&self, message: &str) {
        info!("{}", message);
        (self.messages)(message);
    }

    fn frame_grid(&self, drivers: &DriverSnapshot) {
        let Some(car_number) = pre_race_focus(drivers) else {
            return;
        };
        if let Err(e) = self.camera.focus(car_number, BROADCAST_VIEW) {
            warn!("Could not frame the grid on car #{}: {}", car_number, e);
        }
    }

    fn report_event(&self, event: &Event) {
        if let Some(car_number) = event.focus {
            if let Err(e) = self.camera.focus(car_number, BROADCAST_VIEW) {
                self.report(&format!("Camera error: {e}"));
            }
        }

        let started_at = self.session.recording_started_at();
        match self
            .commentary
            .narrate(&CommentaryRequest::play_by_play(event, started_at))
        {
            Ok(text) => self.report(&text),
            Err(e) => {
                self.report(&format!("Commentary error: {e}"));
                return;
            }
        }

        if rand::thread_rng().gen_bool(self.color_chance.clamp(0., 1.)) {
            match self
                .commentary
                .narrate(&CommentaryRequest::color(event, started_at))
            {
                Ok(text) => self.report(&text),
                Err(e) => self.report(&format!("Commentary error: {e}")),
            }
        }
    }
}

impl<F: TelemetryFeed + Send + 'static> LoopBody for DirectionLoop<F> {
    fn tick(&mut self) {
        let tick = match read_tick(&self.feed) {
            Ok(tick) => tick,
            Err(e) => {
                debug!("Direction skipped a tick: {}", e);
                return;
            }
        };

        let (phase, just_started) = self.session.update_phase(|phase| {
            let just_started = match (tick.race_laps, tick.session_time_s) {
                (Some(race_laps), Some(session_time_s)) => {
                    phase.observe_clock(race_laps, session_time_s)
                }
                _ => false,
            };
            (*phase, just_started)
        });
        if just_started {
            self.report("The race has started");
        }

        let drivers = self.session.drivers();
        if !phase.started {
            self.frame_grid(&drivers);
            return;
        }

        if !phase.all_cars_started {
            let opened = self.session.update_phase(|phase| {
                phase.update_all_cars_started(&drivers, self.start_grace_s)
            });
            if !opened {
                return;
            }
            info!("All cars are underway after {:.1} s", phase.elapsed_s);
        }

        let next = self.session.with_events(|log| {
            log.expire(self.max_event_age, Instant::now());
            log.select_next()
        });
        if let Some(event) = next {
            debug!("Reporting event {} ({})", event.id, event.kind);
            self.report_event(&event);
        }
    }
}
