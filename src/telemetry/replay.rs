use std::{path::Path, time::Instant};

use log::{debug, info, warn};

use crate::CasterError;

use super::{
    FeedRecord, FeedTick, REPLAY_SPEED_PAUSED, SessionInfo, TelemetryFeed, producer::FeedCommand,
};

/// Plays a recorded session back against the wall clock.
///
/// The replay behaves like the simulator's own replay system: it starts paused,
/// `seek_session_start` rewinds to the first tick, and at speed `n` the session clock advances
/// `n` seconds per wall clock second. `tick()` returns the last recorded tick at or before the
/// replay clock, so any number of readers see the same state.
pub struct ReplayFeed {
    session: SessionInfo,
    ticks: Vec<FeedTick>,
    /// Session clock of each tick, carried forward where a tick has none
    timeline: Vec<f64>,
    connected: bool,
    speed: i32,
    anchor_idx: usize,
    anchored_at: Instant,
    ui_visible: bool,
    recording: bool,
    last_command: Option<FeedCommand>,
}

impl ReplayFeed {
    /// Load a recorded session from a JSON Lines file of `FeedRecord`s.
    pub fn from_file(path: &Path) -> Result<Self, CasterError> {
        let records = serde_jsonlines::json_lines(path)
            .map_err(|e| CasterError::RecordingLoaderError { source: e })?
            .collect::<Result<Vec<FeedRecord>, std::io::Error>>()
            .map_err(|e| CasterError::RecordingLoaderError { source: e })?;
        info!(
            "Loaded {} records from recorded session {}",
            records.len(),
            path.display()
        );
        Self::from_records(records).map_err(|e| match e {
            CasterError::MissingSessionRecord { .. } => CasterError::MissingSessionRecord {
                path: path.display().to_string(),
            },
            other => other,
        })
    }

    pub fn from_records(records: Vec<FeedRecord>) -> Result<Self, CasterError> {
        let mut session = None;
        let mut ticks = Vec::new();
        for record in records {
            match record {
                FeedRecord::Session(info) if session.is_none() => session = Some(info),
                FeedRecord::Session(info) => {
                    warn!(
                        "Ignoring additional session record for {} in recording",
                        info.track_name
                    );
                }
                FeedRecord::Tick(tick) => ticks.push(*tick),
            }
        }
        let session = session.ok_or(CasterError::MissingSessionRecord {
            path: "<memory>".to_string(),
        })?;

        let mut timeline = Vec::with_capacity(ticks.len());
        let mut clock = 0.;
        for tick in &ticks {
            if let Some(time) = tick.session_time_s {
                clock = f64::max(clock, time);
            }
            timeline.push(clock);
        }

        Ok(Self {
            session,
            ticks,
            timeline,
            connected: false,
            speed: REPLAY_SPEED_PAUSED,
            anchor_idx: 0,
            anchored_at: Instant::now(),
            ui_visible: true,
            recording: false,
            last_command: None,
        })
    }

    fn current_index(&self) -> usize {
        if self.ticks.is_empty() {
            return 0;
        }
        if self.speed == REPLAY_SPEED_PAUSED {
            return self.anchor_idx;
        }
        let target = self.timeline[self.anchor_idx]
            + self.anchored_at.elapsed().as_secs_f64() * f64::from(self.speed);
        self.timeline
            .partition_point(|time| *time <= target)
            .saturating_sub(1)
            .min(self.ticks.len() - 1)
    }

    fn reanchor(&mut self, idx: usize) {
        self.anchor_idx = idx;
        self.anchored_at = Instant::now();
    }

    /// True once playback has reached the last recorded tick.
    pub fn is_finished(&self) -> bool {
        self.current_index() + 1 >= self.ticks.len()
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_ui_visible(&self) -> bool {
        self.ui_visible
    }

    pub fn last_command(&self) -> Option<&FeedCommand> {
        self.last_command.as_ref()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl TelemetryFeed for ReplayFeed {
    fn connect(&mut self) -> Result<(), CasterError> {
        if self.ticks.is_empty() {
            return Err(CasterError::TelemetryUnavailable {
                reason: format!(
                    "recorded session at {} contains no telemetry",
                    self.session.track_name
                ),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn session_info(&mut self) -> Result<SessionInfo, CasterError> {
        Ok(self.session.clone())
    }

    fn tick(&mut self) -> Result<FeedTick, CasterError> {
        if !self.connected {
            return Err(CasterError::TelemetryUnavailable {
                reason: "replay is not connected".to_string(),
            });
        }
        let idx = self.current_index();
        self.ticks
            .get(idx)
            .cloned()
            .ok_or(CasterError::TransientReadFailure {
                field: format!("tick {idx}"),
            })
    }

    fn switch_camera(&mut self, car_number: u32, camera_group: i32) -> Result<(), CasterError> {
        debug!("Replay camera on car #{car_number}, group {camera_group}");
        self.last_command = Some(FeedCommand::SwitchCamera {
            car_number,
            camera_group,
        });
        Ok(())
    }

    fn seek_session_start(&mut self) -> Result<(), CasterError> {
        self.reanchor(0);
        self.last_command = Some(FeedCommand::SeekSessionStart);
        Ok(())
    }

    fn set_replay_speed(&mut self, speed: i32) -> Result<(), CasterError> {
        let idx = self.current_index();
        self.reanchor(idx);
        self.speed = speed;
        self.last_command = Some(FeedCommand::ReplaySpeed(speed));
        Ok(())
    }

    fn set_ui_visible(&mut self, visible: bool) -> Result<(), CasterError> {
        self.ui_visible = visible;
        self.last_command = Some(FeedCommand::UiVisible(visible));
        Ok(())
    }

    fn set_recording(&mut self, recording: bool) -> Result<(), CasterError> {
        self.recording = recording;
        self.last_command = Some(FeedCommand::Recording(recording));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.connected = false;
        self.speed = REPLAY_SPEED_PAUSED;
        self.last_command = Some(FeedCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::REPLAY_SPEED_REALTIME;
    use tempfile::TempDir;

    fn records() -> Vec<FeedRecord> {
        let mut records = vec![FeedRecord::Session(SessionInfo {
            track_name: "Lime Rock Park".to_string(),
            track_length: "2.41 km".to_string(),
            ..SessionInfo::default()
        })];
        for tick_no in 0..5 {
            records.push(FeedRecord::Tick(Box::new(FeedTick {
                tick_no,
                session_time_s: Some(100. + 1000. * tick_no as f64),
                ..FeedTick::default()
            })));
        }
        records
    }

    #[test]
    fn test_replay_starts_paused_at_first_tick() {
        let mut feed = ReplayFeed::from_records(records()).unwrap();
        assert!(feed.tick().is_err());
        feed.connect().unwrap();
        assert_eq!(feed.tick().unwrap().tick_no, 0);
        assert_eq!(feed.tick().unwrap().tick_no, 0);
        assert!(!feed.is_finished());
        assert_eq!(feed.len(), 5);
    }

    #[test]
    fn test_replay_realtime_stays_within_current_interval() {
        let mut feed = ReplayFeed::from_records(records()).unwrap();
        feed.connect().unwrap();
        feed.seek_session_start().unwrap();
        feed.set_replay_speed(REPLAY_SPEED_REALTIME).unwrap();
        // ticks are 1000 s apart on the session clock
        assert_eq!(feed.tick().unwrap().tick_no, 0);
        feed.set_replay_speed(REPLAY_SPEED_PAUSED).unwrap();
        assert_eq!(feed.tick().unwrap().tick_no, 0);
        assert_eq!(feed.last_command(), Some(&FeedCommand::ReplaySpeed(0)));
    }

    #[test]
    fn test_fast_forward_reaches_the_end() {
        let mut feed = ReplayFeed::from_records(records()).unwrap();
        feed.connect().unwrap();
        feed.set_replay_speed(i32::MAX).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(feed.tick().unwrap().tick_no, 4);
        assert!(feed.is_finished());
    }

    #[test]
    fn test_commands_update_replay_state() {
        let mut feed = ReplayFeed::from_records(records()).unwrap();
        feed.connect().unwrap();
        feed.set_ui_visible(false).unwrap();
        feed.set_recording(true).unwrap();
        assert!(!feed.is_ui_visible());
        assert!(feed.is_recording());
        feed.shutdown();
        assert!(!feed.is_connected());
        assert_eq!(feed.speed(), REPLAY_SPEED_PAUSED);
    }

    #[test]
    fn test_recording_without_session_is_rejected() {
        let records = vec![FeedRecord::Tick(Box::new(FeedTick::default()))];
        assert!(matches!(
            ReplayFeed::from_records(records),
            Err(CasterError::MissingSessionRecord { .. })
        ));
    }

    #[test]
    fn test_empty_recording_is_unavailable() {
        let mut feed = ReplayFeed::from_records(vec![FeedRecord::Session(SessionInfo::default())])
            .unwrap();
        assert!(matches!(
            feed.connect(),
            Err(CasterError::TelemetryUnavailable { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.jsonl");
        serde_jsonlines::write_json_lines(&path, records()).unwrap();

        let mut feed = ReplayFeed::from_file(&path).unwrap();
        assert_eq!(feed.session_info().unwrap().track_name, "Lime Rock Park");
        assert_eq!(feed.len(), 5);

        let missing = temp_dir.path().join("missing.jsonl");
        assert!(matches!(
            ReplayFeed::from_file(&missing),
            Err(CasterError::RecordingLoaderError { .. })
        ));
    }
}
