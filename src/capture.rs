use std::{fs, path::PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::CasterError;

const APP_INI: &str = "app.ini";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Wmv,
    Avi2,
    Avi,
}

impl VideoFormat {
    fn ini_value(self) -> u8 {
        match self {
            Self::Mp4 => 0,
            Self::Wmv => 1,
            Self::Avi2 => 2,
            Self::Avi => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Framerate {
    #[default]
    #[serde(rename = "60")]
    Fps60,
    #[serde(rename = "30")]
    Fps30,
}

impl Framerate {
    fn ini_value(self) -> u8 {
        match self {
            Self::Fps60 => 0,
            Self::Fps30 => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1920x1080")]
    FullHd,
    #[serde(rename = "1280x720")]
    Hd,
    #[serde(rename = "854x480")]
    Sd,
}

impl Resolution {
    fn ini_value(self) -> u8 {
        match self {
            Self::FullHd => 1,
            Self::Hd => 2,
            Self::Sd => 3,
        }
    }
}

/// How the simulator should capture video while a session is directed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// Simulator documents directory holding `app.ini`. Empty when there is nothing to configure.
    pub simulator_dir: PathBuf,
    pub video_format: VideoFormat,
    pub framerate: Framerate,
    pub resolution: Resolution,
}

impl OutputSettings {
    /// Rewrite the capture keys of the simulator's `app.ini`. Keys missing from the file are not
    /// added. Returns false when no simulator directory is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationWriteFailed` if `app.ini` cannot be read or written.
    pub fn apply(&self) -> Result<bool, CasterError> {
        if self.simulator_dir.as_os_str().is_empty() {
            return Ok(false);
        }

        let path = self.simulator_dir.join(APP_INI);
        let write_failed = |e| CasterError::ConfigurationWriteFailed {
            path: path.display().to_string(),
            source: e,
        };
        let contents = fs::read_to_string(&path).map_err(write_failed)?;
        let updated = self.rewrite(&contents);
        fs::write(&path, updated).map_err(write_failed)?;

        info!(
            "Configured simulator capture in {} ({:?}, {:?}, {:?})",
            path.display(),
            self.video_format,
            self.framerate,
            self.resolution
        );
        Ok(true)
    }

    fn rewrite(&self, contents: &str) -> String {
        let values = [
            ("vidCaptureEnable", 1),
            ("videoCaptureMic", 0),
            ("videoFileFrmt", self.video_format.ini_value()),
            ("videoFramerate", self.framerate.ini_value()),
            ("videoImgSize", self.resolution.ini_value()),
        ];

        let mut rewritten = contents
            .lines()
            .map(|line| {
                let key = line.split_once('=').map(|(key, _)| key.trim());
                match values.iter().find(|(name, _)| Some(*name) == key) {
                    Some((name, value)) => format!("{name}={value}"),
                    None => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        if contents.ends_with('\n') {
            rewritten.push('\n');
        }
        rewritten
    }
}
