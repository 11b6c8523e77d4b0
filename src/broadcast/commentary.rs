use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime},
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{CasterError, events::EventKind};

use super::{CommentaryRequest, CommentaryRole, CommentaryService};

const COLLABORATOR: &str = "Commentary";

/// One narrated line, as written to the transcript.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscriptLine {
    /// Milliseconds since the simulator started recording
    pub offset_ms: u64,
    pub role: CommentaryRole,
    pub kind: EventKind,
    pub text: String,
}

/// Narrates events as plain text: every line goes to the log and, optionally, to a JSON Lines
/// transcript that can be lined up with the simulator's video.
#[derive(Debug, Default)]
pub struct LoggingCommentary {
    transcript: Option<PathBuf>,
    per_word: Option<Duration>,
}

impl LoggingCommentary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(mut self, path: &Path) -> Self {
        self.transcript = Some(path.to_path_buf());
        self
    }

    /// Hold each narration for `per_word` per spoken word, like a commentator reading it out.
    pub fn with_speech_pacing(mut self, per_word: Duration) -> Self {
        self.per_word = Some(per_word);
        self
    }

    fn compose(request: &CommentaryRequest) -> String {
        let subject = request.subject.trim_end_matches('.');
        match request.role {
            CommentaryRole::PlayByPlay if request.yelling => format!("{subject}!"),
            CommentaryRole::PlayByPlay => format!("{subject}."),
            CommentaryRole::Color => match request.kind {
                EventKind::Overtake => {
                    format!("{subject}, and that move could matter come the flag.")
                }
                EventKind::Stopped => format!("{subject}, that is a real blow to their race."),
                EventKind::Collision => {
                    format!("{subject}, the stewards will want a look at that one.")
                }
            },
        }
    }
}

impl CommentaryService for LoggingCommentary {
    fn narrate(&self, request: &CommentaryRequest) -> Result<String, CasterError> {
        let text = Self::compose(request);
        let offset_ms = request.offset_ms(SystemTime::now());
        info!("[{}] {}", request.role, text);

        if let Some(path) = &self.transcript {
            let line = TranscriptLine {
                offset_ms,
                role: request.role,
                kind: request.kind,
                text: text.clone(),
            };
            serde_jsonlines::append_json_lines(path, [line]).map_err(|e| {
                CasterError::CollaboratorFailure {
                    collaborator: COLLABORATOR.to_string(),
                    description: format!("could not write transcript {}: {e}", path.display()),
                }
            })?;
        }

        if let Some(per_word) = self.per_word {
            let words = text.split_whitespace().count() as u32;
            thread::sleep(per_word * words);
        }
        Ok(text)
    }
}
