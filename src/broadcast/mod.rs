pub mod camera;
pub mod commentary;

pub use camera::FeedCamera;
pub use commentary::LoggingCommentary;

use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::{
    CasterError,
    events::{Event, EventKind},
};

const DEFAULT_TONE: &str = "neutral";
const OVERTAKE_INSTRUCTION: &str = "Be sure to include the position of the overtaking driver.";
const COLOR_INSTRUCTION: &str = "Don't repeat the event. Add some color commentary.";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommentaryRole {
    #[serde(rename = "play-by-play")]
    PlayByPlay,
    #[serde(rename = "color")]
    Color,
}

impl fmt::Display for CommentaryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayByPlay => f.write_str("play-by-play"),
            Self::Color => f.write_str("color"),
        }
    }
}

/// What a commentator is asked to say about an event.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentaryRequest {
    /// Prompt handed to the commentator
    pub description: String,
    /// The event being talked about
    pub subject: String,
    pub kind: EventKind,
    pub lap_percent: Option<f32>,
    pub role: CommentaryRole,
    pub tone: String,
    pub extra_instruction: Option<String>,
    pub yelling: bool,
    /// Wall-clock time the simulator started recording, to timestamp the narration
    pub recording_started_at: SystemTime,
}

impl CommentaryRequest {
    pub fn play_by_play(event: &Event, recording_started_at: SystemTime) -> Self {
        let extra_instruction = match event.kind {
            EventKind::Overtake => Some(OVERTAKE_INSTRUCTION.to_string()),
            _ => None,
        };
        Self {
            description: event.description.clone(),
            subject: event.description.clone(),
            kind: event.kind,
            lap_percent: event.lap_percent,
            role: CommentaryRole::PlayByPlay,
            tone: DEFAULT_TONE.to_string(),
            extra_instruction,
            yelling: true,
            recording_started_at,
        }
    }

    /// Follow-up from the color commentator about an event that was just called.
    pub fn color(event: &Event, recording_started_at: SystemTime) -> Self {
        Self {
            description: format!(
                "It was just announced that {}. Add some color commentary.",
                event.description
            ),
            role: CommentaryRole::Color,
            extra_instruction: Some(COLOR_INSTRUCTION.to_string()),
            ..Self::play_by_play(event, recording_started_at)
        }
    }

    /// Milliseconds from the start of the recording to `now`, zero if `now` is earlier.
    pub fn offset_ms(&self, now: SystemTime) -> u64 {
        now.duration_since(self.recording_started_at)
            .map(|offset| offset.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Turns commentary requests into narration.
pub trait CommentaryService: Send + Sync {
    /// Narrate `request` and return the text that was said.
    fn narrate(&self, request: &CommentaryRequest) -> Result<String, CasterError>;
}

/// Points the broadcast camera.
pub trait CameraClient: Send + Sync {
    fn focus(&self, car_number: u32, view: &str) -> Result<(), CasterError>;
}
