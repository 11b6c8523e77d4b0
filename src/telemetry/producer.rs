#[cfg(windows)]
use std::time::Duration;

use crate::CasterError;

use super::{FeedTick, SessionInfo};

#[allow(unused)]
const CONN_RETRY_WAIT_MS: u64 = 200;

/// Access to a running (or replayed) simulator session.
///
/// A feed is polled: every call to `tick()` returns the simulator's latest state, so several
/// readers may share one feed without consuming each other's data. Besides reading, a feed
/// accepts the broadcast commands the director needs to frame and record a session.
///
/// # Lifecycle
///
/// 1. Call `connect()` to attach to the simulator or data source
/// 2. Call `session_info()` to retrieve roster, qualifying results and camera groups
/// 3. Call `tick()` repeatedly, and issue commands as needed
/// 4. Call `shutdown()` to release the connection
pub trait TelemetryFeed {
    /// Attach to the data source.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryUnavailable` if the simulator is not running or the source is empty.
    fn connect(&mut self) -> Result<(), CasterError>;

    fn is_connected(&self) -> bool;

    /// Roster, qualifying results, track length and camera groups of the current session.
    fn session_info(&mut self) -> Result<SessionInfo, CasterError>;

    /// The simulator's current state. Fields that could not be read are left as `None`.
    fn tick(&mut self) -> Result<FeedTick, CasterError>;

    /// Point the broadcast camera at `car_number` using camera group `camera_group`.
    fn switch_camera(&mut self, car_number: u32, camera_group: i32) -> Result<(), CasterError>;

    /// Move the replay to the first frame of the current session.
    fn seek_session_start(&mut self) -> Result<(), CasterError>;

    fn set_replay_speed(&mut self, speed: i32) -> Result<(), CasterError>;

    fn set_ui_visible(&mut self, visible: bool) -> Result<(), CasterError>;

    fn set_recording(&mut self, recording: bool) -> Result<(), CasterError>;

    fn shutdown(&mut self);
}

/// Commands a `ScriptedFeed` received, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedCommand {
    SwitchCamera { car_number: u32, camera_group: i32 },
    SeekSessionStart,
    ReplaySpeed(i32),
    UiVisible(bool),
    Recording(bool),
    Shutdown,
}

/// A feed that plays back a fixed list of ticks and records every command it receives.
///
/// By default the current tick only moves when `advance()` is called, which keeps tests
/// deterministic. `advancing_on_read()` makes every `tick()` call move forward instead, stopping
/// at the last tick, for driving the director's loops.
pub struct ScriptedFeed {
    session: SessionInfo,
    ticks: Vec<FeedTick>,
    cur_tick: usize,
    advance_on_read: bool,
    available: bool,
    connected: bool,
    rejected: Option<FeedCommand>,
    pub commands: Vec<FeedCommand>,
}

impl ScriptedFeed {
    pub fn new(session: SessionInfo, ticks: Vec<FeedTick>) -> Self {
        Self {
            session,
            ticks,
            cur_tick: 0,
            advance_on_read: false,
            available: true,
            connected: false,
            rejected: None,
            commands: Vec::new(),
        }
    }

    /// A feed whose simulator is not running; `connect()` fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(SessionInfo::default(), Vec::new())
        }
    }

    pub fn advancing_on_read(mut self) -> Self {
        self.advance_on_read = true;
        self
    }

    /// Fail every `command` sent to this feed with `FeedCommandError`.
    pub fn rejecting(mut self, command: FeedCommand) -> Self {
        self.rejected = Some(command);
        self
    }

    fn command(&mut self, command: FeedCommand) -> Result<(), CasterError> {
        if self.rejected.as_ref() == Some(&command) {
            return Err(CasterError::FeedCommandError {
                description: format!("scripted feed rejected {command:?}"),
            });
        }
        self.commands.push(command);
        Ok(())
    }

    /// Moves to the next tick. Returns false once the last tick is reached.
    pub fn advance(&mut self) -> bool {
        if self.cur_tick + 1 < self.ticks.len() {
            self.cur_tick += 1;
            true
        } else {
            false
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.cur_tick + 1 >= self.ticks.len()
    }
}

impl TelemetryFeed for ScriptedFeed {
    fn connect(&mut self) -> Result<(), CasterError> {
        if !self.available {
            return Err(CasterError::TelemetryUnavailable {
                reason: "scripted simulator is not running".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn session_info(&mut self) -> Result<SessionInfo, CasterError> {
        if !self.connected {
            return Err(CasterError::TelemetryUnavailable {
                reason: "call connect() first".to_string(),
            });
        }
        Ok(self.session.clone())
    }

    fn tick(&mut self) -> Result<FeedTick, CasterError> {
        let tick = self
            .ticks
            .get(self.cur_tick)
            .cloned()
            .ok_or(CasterError::TransientReadFailure {
                field: "tick".to_string(),
            })?;
        if self.advance_on_read {
            self.advance();
        }
        Ok(tick)
    }

    fn switch_camera(&mut self, car_number: u32, camera_group: i32) -> Result<(), CasterError> {
        self.command(FeedCommand::SwitchCamera {
            car_number,
            camera_group,
        })
    }

    fn seek_session_start(&mut self) -> Result<(), CasterError> {
        self.command(FeedCommand::SeekSessionStart)?;
        self.cur_tick = 0;
        Ok(())
    }

    fn set_replay_speed(&mut self, speed: i32) -> Result<(), CasterError> {
        self.command(FeedCommand::ReplaySpeed(speed))
    }

    fn set_ui_visible(&mut self, visible: bool) -> Result<(), CasterError> {
        self.command(FeedCommand::UiVisible(visible))
    }

    fn set_recording(&mut self, recording: bool) -> Result<(), CasterError> {
        self.command(FeedCommand::Recording(recording))
    }

    fn shutdown(&mut self) {
        self.connected = false;
        self.commands.push(FeedCommand::Shutdown);
    }
}

/// Live iRacing session read through simetry's shared memory client.
///
/// simetry exposes the telemetry and session YAML but not the broadcast message channel, so the
/// command half of the feed is unavailable; this feed is used to record sessions that are later
/// directed from the recording.
#[cfg(windows)]
pub struct IRacingFeed {
    client: Option<simetry::iracing::Client>,
    runtime: Option<tokio::runtime::Runtime>,
    retry_wait_ms: u64,
    tick_no: usize,
}

#[cfg(windows)]
impl Default for IRacingFeed {
    fn default() -> Self {
        IRacingFeed::new(CONN_RETRY_WAIT_MS)
    }
}

#[cfg(windows)]
impl IRacingFeed {
    pub fn new(retry_wait_ms: u64) -> Self {
        Self {
            client: None,
            runtime: None,
            retry_wait_ms,
            tick_no: 0,
        }
    }

    fn next_state(&mut self) -> Result<simetry::iracing::SimState, CasterError> {
        let (Some(client), Some(runtime)) = (self.client.as_mut(), self.runtime.as_ref()) else {
            return Err(CasterError::TelemetryUnavailable {
                reason: "The iRacing connection is not initialized, call connect() first."
                    .to_string(),
            });
        };
        runtime
            .block_on(client.next_sim_state())
            .ok_or(CasterError::TelemetryUnavailable {
                reason: "Could not retrieve iRacing state".to_string(),
            })
    }

    fn unsupported(command: &str) -> CasterError {
        CasterError::FeedCommandError {
            description: format!("{command} is not available on a live iRacing feed"),
        }
    }
}

#[cfg(windows)]
impl TelemetryFeed for IRacingFeed {
    fn connect(&mut self) -> Result<(), CasterError> {
        let retry_delay = Duration::from_millis(self.retry_wait_ms);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CasterError::NoSimulatorSession { source: e })?;
        let client = runtime.block_on(simetry::iracing::Client::connect(retry_delay));

        self.client = Some(client);
        self.runtime = Some(runtime);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn session_info(&mut self) -> Result<SessionInfo, CasterError> {
        use super::{CameraGroup, QualifyingResult, RosterEntry};

        let state = self.next_state()?;
        let session_info = state.session_info();

        let track_name = session_info["WeekendInfo"]["TrackDisplayName"]
            .as_str()
            .unwrap_or("Unknown")
            .to_string();
        let track_length = session_info["WeekendInfo"]["TrackLength"]
            .as_str()
            .unwrap_or("0.0 km")
            .to_string();

        let pace_car_idx = session_info["DriverInfo"]["PaceCarIdx"].as_i64();
        let roster = session_info["DriverInfo"]["Drivers"]
            .as_vec()
            .map(|drivers| {
                drivers
                    .iter()
                    .filter_map(|driver| {
                        let car_idx = driver["CarIdx"].as_i64()?;
                        Some(RosterEntry {
                            car_idx: car_idx as usize,
                            car_number: driver["CarNumberRaw"].as_i64().unwrap_or(0) as u32,
                            user_name: driver["UserName"].as_str().unwrap_or("").to_string(),
                            car_name: driver["CarScreenNameShort"]
                                .as_str()
                                .unwrap_or("")
                                .to_string(),
                            license: driver["LicString"].as_str().unwrap_or("").to_string(),
                            rating: driver["IRating"].as_i64().unwrap_or(0) as i32,
                            is_pace_car: driver["CarIsPaceCar"].as_i64() == Some(1)
                                || pace_car_idx == Some(car_idx),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let qualifying = session_info["SessionInfo"]["Sessions"]
            .as_vec()
            .and_then(|sessions| {
                sessions
                    .iter()
                    .find(|session| session["SessionName"].as_str() == Some("QUALIFY"))
            })
            .and_then(|session| session["ResultsPositions"].as_vec())
            .map(|results| {
                results
                    .iter()
                    .filter_map(|result| {
                        Some(QualifyingResult {
                            car_idx: result["CarIdx"].as_i64()? as usize,
                            position: result["Position"].as_i64()? as u32,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let camera_groups = session_info["CameraInfo"]["Groups"]
            .as_vec()
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|group| {
                        Some(CameraGroup {
                            number: group["GroupNum"].as_i64()? as i32,
                            name: group["GroupName"].as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SessionInfo {
            track_name,
            track_length,
            roster,
            qualifying,
            camera_groups,
        })
    }

    fn tick(&mut self) -> Result<FeedTick, CasterError> {
        use super::TrackSurface;

        let state = self.next_state()?;
        self.tick_no = self.tick_no.wrapping_add(1);

        let incidents = state.session_info()["DriverInfo"]["Drivers"]
            .as_vec()
            .map(|drivers| {
                let mut incidents = Vec::new();
                for driver in drivers {
                    let (Some(car_idx), Some(count)) = (
                        driver["CarIdx"].as_i64(),
                        driver["CurDriverIncidentCount"].as_i64(),
                    ) else {
                        continue;
                    };
                    let car_idx = car_idx as usize;
                    if incidents.len() <= car_idx {
                        incidents.resize(car_idx + 1, 0);
                    }
                    incidents[car_idx] = count as i32;
                }
                incidents
            });

        Ok(FeedTick {
            tick_no: self.tick_no,
            session_time_s: state.read_name::<f64>("SessionTime"),
            race_laps: state.read_name::<i32>("RaceLaps"),
            car_idx_position: state.read_name::<Vec<i32>>("CarIdxPosition"),
            car_idx_lap: state.read_name::<Vec<i32>>("CarIdxLap"),
            car_idx_lap_completed: state.read_name::<Vec<i32>>("CarIdxLapCompleted"),
            car_idx_lap_dist_pct: state.read_name::<Vec<f32>>("CarIdxLapDistPct"),
            car_idx_last_lap_time: state.read_name::<Vec<f32>>("CarIdxLastLapTime"),
            car_idx_f2_time: state.read_name::<Vec<f32>>("CarIdxF2Time"),
            car_idx_track_surface: state
                .read_name::<Vec<i32>>("CarIdxTrackSurface")
                .map(|values| values.into_iter().map(TrackSurface::from_irsdk).collect()),
            car_idx_incidents: incidents,
        })
    }

    fn switch_camera(&mut self, _car_number: u32, _camera_group: i32) -> Result<(), CasterError> {
        Err(Self::unsupported("camera switching"))
    }

    fn seek_session_start(&mut self) -> Result<(), CasterError> {
        Err(Self::unsupported("replay search"))
    }

    fn set_replay_speed(&mut self, _speed: i32) -> Result<(), CasterError> {
        Err(Self::unsupported("replay speed"))
    }

    fn set_ui_visible(&mut self, _visible: bool) -> Result<(), CasterError> {
        Err(Self::unsupported("UI visibility"))
    }

    fn set_recording(&mut self, _recording: bool) -> Result<(), CasterError> {
        Err(Self::unsupported("video capture"))
    }

    fn shutdown(&mut self) {
        self.client = None;
        self.runtime = None;
    }
}
