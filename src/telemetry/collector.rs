use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

use log::{info, warn};

use crate::CasterError;

use super::{FeedRecord, TelemetryFeed};

/// Polls `feed` every `interval` and forwards its session and ticks to `record_sender` until a
/// message arrives on `stop` or its sender is dropped.
///
/// A tick that cannot be read is skipped; a closed record channel ends the recording with an error.
pub fn record_session(
    mut feed: impl TelemetryFeed,
    interval: Duration,
    record_sender: Sender<FeedRecord>,
    stop: Receiver<()>,
) -> Result<usize, CasterError> {
    feed.connect()?;
    let session = feed.session_info()?;
    info!(
        "Recording session at {} with {} cars",
        session.track_name,
        session.roster.len()
    );
    record_sender.send(FeedRecord::Session(session))?;

    let mut recorded = 0;
    loop {
        match feed.tick() {
            Ok(tick) => {
                record_sender.send(FeedRecord::Tick(Box::new(tick)))?;
                recorded += 1;
            }
            Err(e) => warn!("Skipping tick: {}", e),
        }

        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    feed.shutdown();
    info!("Recorded {} ticks", recorded);
    Ok(recorded)
}
