use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::mpsc::Receiver,
};

use log::error;

use crate::CasterError;

use super::FeedRecord;

/// Writes every record received on `record_receiver` to `file` as JSON Lines, until the channel
/// closes. Returns the number of records written.
pub fn write_session(
    file: &Path,
    record_receiver: Receiver<FeedRecord>,
) -> Result<usize, CasterError> {
    let session_file = File::create(file).map_err(|e| CasterError::WriterError { source: e })?;
    let mut session_file_writer = BufWriter::new(session_file);
    let mut written = 0;
    for record in &record_receiver {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                error!("Could not serialize recorded session record: {}", e);
                continue;
            }
        };
        match writeln!(session_file_writer, "{}", line) {
            Ok(()) => written += 1,
            Err(e) => error!("Error while writing record to output file: {}", e),
        }
    }
    session_file_writer
        .flush()
        .map_err(|e| CasterError::WriterError { source: e })?;
    Ok(written)
}
