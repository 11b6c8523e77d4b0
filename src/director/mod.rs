mod loops;
mod session;

pub use session::RaceSession;

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use log::{debug, info, warn};

use crate::{
    CasterError,
    broadcast::{CameraClient, CommentaryService},
    config::DirectorConfig,
    events::{EventDetector, EventLog},
    race::{Driver, SnapshotBuilder},
    telemetry::{REPLAY_SPEED_PAUSED, REPLAY_SPEED_REALTIME, TelemetryFeed},
};

use loops::{DetectionLoop, DirectionLoop, LoopHandle, spawn_loop, stop_all};

/// Camera view used for every cut
pub const BROADCAST_VIEW: &str = "TV1";

const DETECTION_LOOP_NAME: &str = "detection";
const DIRECTION_LOOP_NAME: &str = "direction";

/// Receives every line the director wants shown to the operator.
pub type MessageLog = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectorState {
    Idle,
    Armed,
    Running,
}

impl fmt::Display for DirectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

/// Directs a broadcast of one session: prepares the simulator for recording, then runs a
/// detection loop and a direction loop until stopped.
pub struct RaceDirector<F: TelemetryFeed + Send + 'static> {
    config: DirectorConfig,
    feed: Arc<Mutex<F>>,
    camera: Arc<dyn CameraClient>,
    commentary: Arc<dyn CommentaryService>,
    messages: MessageLog,
    state: DirectorState,
    session: Option<Arc<RaceSession>>,
    loops: Vec<LoopHandle>,
}

impl<F: TelemetryFeed + Send + 'static> RaceDirector<F> {
    pub fn new(
        config: DirectorConfig,
        feed: Arc<Mutex<F>>,
        camera: Arc<dyn CameraClient>,
        commentary: Arc<dyn CommentaryService>,
        messages: MessageLog,
    ) -> Self {
        Self {
            config,
            feed,
            camera,
            commentary,
            messages,
            state: DirectorState::Idle,
            session: None,
            loops: Vec::new(),
        }
    }

    pub fn state(&self) -> DirectorState {
        self.state
    }

    /// Shared state of the current, or last, directed session.
    pub fn session(&self) -> Option<Arc<RaceSession>> {
        self.session.clone()
    }

    /// Prepare the simulator and start both loops.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidDirectorState` unless idle. Any failure while preparing the simulator
    /// or spawning the loops is returned and leaves the director idle.
    pub fn start(&mut self) -> Result<(), CasterError> {
        if self.state != DirectorState::Idle {
            return Err(CasterError::InvalidDirectorState {
                action: "start".to_string(),
                state: self.state.to_string(),
            });
        }

        match self.arm().and_then(|builder| self.spawn_loops(builder)) {
            Ok(()) => {
                self.state = DirectorState::Running;
                self.report("Director started");
                Ok(())
            }
            Err(e) => {
                self.state = DirectorState::Idle;
                Err(e)
            }
        }
    }

    fn arm(&mut self) -> Result<SnapshotBuilder, CasterError> {
        self.config.validate()?;
        if self.config.output.apply()? {
            self.report("Simulator capture configured");
        }

        let builder = {
            let mut feed = self.feed.lock().unwrap_or_else(PoisonError::into_inner);
            if !feed.is_connected() {
                feed.connect()?;
            }
            match prepare_feed(&mut *feed) {
                Ok(builder) => builder,
                Err(e) => {
                    warn!("Could not prepare the simulator: {}", e);
                    abandon_feed(&mut *feed);
                    return Err(e);
                }
            }
        };

        let events =
            EventLog::new().with_duplicate_suppression(self.config.suppress_duplicate_events);
        self.session = Some(Arc::new(RaceSession::new(
            builder.snapshot(),
            events,
            SystemTime::now(),
        )));
        self.state = DirectorState::Armed;
        Ok(builder)
    }

    fn spawn_loops(&mut self, builder: SnapshotBuilder) -> Result<(), CasterError> {
        let Some(session) = self.session.clone() else {
            return Err(CasterError::InvalidDirectorState {
                action: "spawn loops".to_string(),
                state: self.state.to_string(),
            });
        };

        let detection = DetectionLoop {
            feed: self.feed.clone(),
            session: session.clone(),
            previous: builder.snapshot(),
            builder,
            detector: EventDetector::new(self.config.detector()),
            max_event_age: self.config.max_event_age(),
            last_tick_no: None,
        };
        let direction = DirectionLoop {
            feed: self.feed.clone(),
            session,
            camera: self.camera.clone(),
            commentary: self.commentary.clone(),
            messages: self.messages.clone(),
            color_chance: self.config.color_chance,
            max_event_age: self.config.max_event_age(),
            start_grace_s: self.config.start_grace_s,
        };

        let spawned = spawn_loop(
            DETECTION_LOOP_NAME,
            self.config.detection_interval(),
            detection,
        )
        .and_then(|detection| {
            let direction = spawn_loop(
                DIRECTION_LOOP_NAME,
                self.config.direction_interval(),
                direction,
            )?;
            Ok(vec![detection, direction])
        });
        match spawned {
            Ok(loops) => {
                self.loops = loops;
                Ok(())
            }
            Err(e) => {
                self.release_feed();
                Err(e)
            }
        }
    }

    /// Stop both loops, end the recording and release the feed. Does nothing when idle.
    pub fn stop(&mut self) {
        if self.state == DirectorState::Idle {
            return;
        }
        stop_all(&mut self.loops);
        self.loops.clear();
        self.release_feed();
        self.state = DirectorState::Idle;
        self.report("Director stopped");
    }

    fn release_feed(&self) {
        let mut feed = self.feed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = feed.set_recording(false) {
            warn!("Could not stop recording: {}", e);
        }
        if let Err(e) = feed.set_replay_speed(REPLAY_SPEED_PAUSED) {
            warn!("Could not pause the replay: {}", e);
        }
        feed.shutdown();
    }

    fn report(&self, message: &str) {
        info!("{}", message);
        (self.messages)(message);
    }
}

impl<F: TelemetryFeed + Send + 'static> Drop for RaceDirector<F> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Load the session and put the simulator into broadcast mode.
fn prepare_feed<F: TelemetryFeed>(feed: &mut F) -> Result<SnapshotBuilder, CasterError> {
    let builder = SnapshotBuilder::initialize(feed)?;
    feed.seek_session_start()?;
    feed.set_ui_visible(false)?;
    feed.set_replay_speed(REPLAY_SPEED_REALTIME)?;
    feed.set_recording(true)?;
    Ok(builder)
}

/// Undo a partial `prepare_feed` and release the feed.
fn abandon_feed<F: TelemetryFeed>(feed: &mut F) {
    for (command, result) in [
        ("stop recording", feed.set_recording(false)),
        ("pause the replay", feed.set_replay_speed(REPLAY_SPEED_PAUSED)),
        ("show the UI", feed.set_ui_visible(true)),
    ] {
        if let Err(e) = result {
            debug!("Could not {} while abandoning the session: {}", command, e);
        }
    }
    feed.shutdown();
}

/// Car to frame before the start: the best qualifier that is out of the pits and in the world.
pub fn pre_race_focus(drivers: &[Driver]) -> Option<u32> {
    drivers
        .iter()
        .filter(|driver| !driver.in_pits && driver.lap_percent >= 0.)
        .min_by_key(|driver| (driver.grid_position, driver.car_idx))
        .map(|driver| driver.car_number)
}
