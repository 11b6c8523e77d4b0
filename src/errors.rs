// Error types for racecaster

use crate::telemetry::FeedRecord;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum CasterError {
    // Errors reaching the telemetry feed
    #[snafu(display("Telemetry feed unavailable: {reason}"))]
    TelemetryUnavailable { reason: String },
    #[snafu(display("Unable to find simulator session"))]
    NoSimulatorSession { source: io::Error },
    #[snafu(display("Telemetry feed command failed: {description}"))]
    FeedCommandError { description: String },

    // Errors while reading a single tick. Never fatal to a running session.
    #[snafu(display("Could not read telemetry field {field}"))]
    TransientReadFailure { field: String },

    // Errors from the commentary and camera collaborators
    #[snafu(display("{collaborator} failed: {description}"))]
    CollaboratorFailure {
        collaborator: String,
        description: String,
    },

    // Errors applying the simulator output configuration
    #[snafu(display("Could not write simulator output configuration {path}"))]
    ConfigurationWriteFailed { path: String, source: io::Error },

    // Errors for recorded sessions
    #[snafu(display("Error loading recorded session"))]
    RecordingLoaderError { source: io::Error },
    #[snafu(display("Recorded session {path} contains no session information"))]
    MissingSessionRecord { path: String },
    #[snafu(display("Error writing recorded session"))]
    WriterError { source: io::Error },
    #[snafu(display("Error broadcasting recorded session record"))]
    RecordBroadcastError { source: Box<SendError<FeedRecord>> },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid configuration: {field} - {reason}"))]
    InvalidConfig { field: String, reason: String },

    // Director lifecycle errors
    #[snafu(display("Cannot {action} while the director is {state}"))]
    InvalidDirectorState { action: String, state: String },
    #[snafu(display("Could not spawn {name} loop"))]
    LoopSpawnError { name: String, source: io::Error },
}

impl From<SendError<FeedRecord>> for CasterError {
    fn from(value: SendError<FeedRecord>) -> Self {
        CasterError::RecordBroadcastError {
            source: Box::new(value),
        }
    }
}
