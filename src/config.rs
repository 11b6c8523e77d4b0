use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{CasterError, capture::OutputSettings, events::DetectorConfig};

const APP_DIR_NAME: &str = "racecaster";
const CONFIG_FILE_NAME: &str = "config.json";

const DETECTION_INTERVAL_MS: u64 = 1000;
const DIRECTION_INTERVAL_MS: u64 = 1000;
const MAX_EVENT_AGE_S: u64 = 25;
const COLOR_CHANCE: f64 = 0.5;
const START_GRACE_S: f64 = 20.;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectorConfig {
    pub detection_interval_ms: u64,
    pub direction_interval_ms: u64,
    pub max_event_age_s: u64,
    /// Probability of color commentary after each play-by-play line
    pub color_chance: f64,
    pub stopped_cooldown_s: u64,
    pub stopped_distance_m: f64,
    pub collision_incident_delta: i32,
    pub collision_lap_tolerance: f32,
    pub report_collisions: bool,
    pub suppress_duplicate_events: bool,
    /// Seconds after the start during which a slow car keeps the field from counting as started
    pub start_grace_s: f64,
    /// Refuse camera views that a real broadcast would not use
    pub realistic_camera: bool,
    pub output: OutputSettings,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        let detector = DetectorConfig::default();
        Self {
            detection_interval_ms: DETECTION_INTERVAL_MS,
            direction_interval_ms: DIRECTION_INTERVAL_MS,
            max_event_age_s: MAX_EVENT_AGE_S,
            color_chance: COLOR_CHANCE,
            stopped_cooldown_s: detector.stopped_cooldown.as_secs(),
            stopped_distance_m: detector.stopped_distance_m,
            collision_incident_delta: detector.collision_incident_delta,
            collision_lap_tolerance: detector.collision_lap_tolerance,
            report_collisions: detector.report_collisions,
            suppress_duplicate_events: false,
            start_grace_s: START_GRACE_S,
            realistic_camera: true,
            output: OutputSettings::default(),
        }
    }
}

impl DirectorConfig {
    pub fn default_path() -> Result<PathBuf, CasterError> {
        Ok(dirs::config_dir()
            .ok_or(CasterError::NoConfigDir)?
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// The saved configuration, or `None` if nothing was saved yet.
    pub fn from_local_file() -> Result<Option<Self>, CasterError> {
        let config_path = Self::default_path()?;
        if config_path.exists() {
            Self::from_file(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CasterError> {
        let file = File::open(path).map_err(|e| CasterError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CasterError::ConfigSerializeError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, CasterError> {
        let config_path = Self::default_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), CasterError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CasterError::ConfigIOError { source: e })?;
        }

        let file = File::create(config_path)
            .map_err(|e| CasterError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| CasterError::ConfigSerializeError { source: e })
    }

    /// Reject settings the director cannot run with.
    pub fn validate(&self) -> Result<(), CasterError> {
        let invalid = |field: &str, reason: &str| -> Result<(), CasterError> {
            Err(CasterError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.detection_interval_ms == 0 {
            return invalid("detection_interval_ms", "must be greater than zero");
        }
        if self.direction_interval_ms == 0 {
            return invalid("direction_interval_ms", "must be greater than zero");
        }
        if !(0. ..=1.).contains(&self.color_chance) {
            return invalid("color_chance", "must be between 0 and 1");
        }
        if self.collision_lap_tolerance < 0. {
            return invalid("collision_lap_tolerance", "must not be negative");
        }
        Ok(())
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn direction_interval(&self) -> Duration {
        Duration::from_millis(self.direction_interval_ms)
    }

    pub fn max_event_age(&self) -> Duration {
        Duration::from_secs(self.max_event_age_s)
    }

    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            stopped_distance_m: self.stopped_distance_m,
            stopped_cooldown: Duration::from_secs(self.stopped_cooldown_s),
            collision_incident_delta: self.collision_incident_delta,
            collision_lap_tolerance: self.collision_lap_tolerance,
            report_collisions: self.report_collisions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoFormat;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DirectorConfig::default();
        assert_eq!(config.detection_interval(), Duration::from_secs(1));
        assert_eq!(config.direction_interval(), Duration::from_secs(1));
        assert_eq!(config.max_event_age(), Duration::from_secs(25));
        assert!((config.color_chance - 0.5).abs() < f64::EPSILON);
        assert!(!config.report_collisions);
        assert_eq!(config.detector(), DetectorConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = DirectorConfig {
            color_chance: 0.1,
            report_collisions: true,
            output: OutputSettings {
                video_format: VideoFormat::Avi,
                ..OutputSettings::default()
            },
            ..DirectorConfig::default()
        };
        config.save_to(&path).unwrap();

        let loaded = DirectorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"max_event_age_s": 10}"#).unwrap();

        let loaded = DirectorConfig::from_file(&path).unwrap();
        assert_eq!(loaded.max_event_age(), Duration::from_secs(10));
        assert_eq!(loaded.detection_interval_ms, DETECTION_INTERVAL_MS);
        assert!(loaded.realistic_camera);
    }

    #[test]
    fn test_out_of_range_settings_are_rejected() {
        assert!(DirectorConfig::default().validate().is_ok());
        for config in [
            DirectorConfig {
                detection_interval_ms: 0,
                ..DirectorConfig::default()
            },
            DirectorConfig {
                color_chance: 1.5,
                ..DirectorConfig::default()
            },
            DirectorConfig {
                collision_lap_tolerance: -0.1,
                ..DirectorConfig::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(CasterError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DirectorConfig::from_file(&path),
            Err(CasterError::ConfigSerializeError { .. })
        ));
    }
}
