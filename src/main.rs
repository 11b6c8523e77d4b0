use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{error, info};

use racecaster::{
    CasterError, DirectorConfig, RaceDirector, ReplayFeed,
    broadcast::{FeedCamera, LoggingCommentary},
    director::MessageLog,
};

/// How often `direct` checks for Ctrl-C and the end of the replay
const WAIT_POLL_MS: u64 = 500;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Direct a broadcast of a recorded session
    Direct {
        #[arg(short, long)]
        input: PathBuf,

        /// JSON Lines file that receives every narrated line
        #[arg(short, long)]
        transcript: Option<PathBuf>,

        /// Configuration file to use instead of the saved one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Record a live iRacing session for later directing
    #[cfg(windows)]
    Record {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Write the default configuration file
    InitConfig {
        #[arg(short, long)]
        force: bool,
    },
}

fn direct(
    input: &Path,
    transcript: Option<&Path>,
    config: Option<&Path>,
    stop: &Receiver<()>,
) -> Result<(), CasterError> {
    let config = match config {
        Some(path) => DirectorConfig::from_file(path)?,
        None => DirectorConfig::from_local_file()?.unwrap_or_default(),
    };

    let feed = Arc::new(Mutex::new(ReplayFeed::from_file(input)?));
    let camera = FeedCamera::from_feed(feed.clone(), config.realistic_camera)?;
    let mut commentary = LoggingCommentary::new();
    if let Some(transcript) = transcript {
        commentary = commentary.with_transcript(transcript);
    }
    let messages: MessageLog = Arc::new(|message: &str| println!("{message}"));

    let mut director = RaceDirector::new(
        config,
        feed.clone(),
        Arc::new(camera),
        Arc::new(commentary),
        messages,
    );
    director.start()?;

    loop {
        match stop.recv_timeout(Duration::from_millis(WAIT_POLL_MS)) {
            Err(RecvTimeoutError::Timeout) => {
                if feed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_finished()
                {
                    info!("Reached the end of the recorded session");
                    break;
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("Stopping...");
                break;
            }
        }
    }
    director.stop();
    Ok(())
}

#[cfg(windows)]
fn record(output: &Path, interval_ms: u64, stop: Receiver<()>) -> Result<(), CasterError> {
    use racecaster::telemetry::{self, IRacingFeed, writer};
    use std::thread;

    let (record_tx, record_rx) = mpsc::channel::<telemetry::FeedRecord>();
    let output_file = output.to_path_buf();
    let writer = thread::spawn(move || writer::write_session(&output_file, record_rx));

    let recorded = telemetry::record_session(
        IRacingFeed::default(),
        Duration::from_millis(interval_ms),
        record_tx,
        stop,
    )?;
    let written = writer.join().map_err(|_| CasterError::WriterError {
        source: std::io::Error::other("writer thread panicked"),
    })??;
    info!(
        "Recorded {} ticks, wrote {} records to {}",
        recorded,
        written,
        output.display()
    );
    Ok(())
}

fn init_config(force: bool) -> Result<(), CasterError> {
    let path = DirectorConfig::default_path()?;
    if path.exists() && !force {
        println!(
            "Configuration already exists at {}, use --force to overwrite it",
            path.display()
        );
        return Ok(());
    }
    DirectorConfig::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        // the receiver is gone once the command has finished
        let _ = stop_tx.send(());
    })
    .expect("Could not set Ctrl-C handler");

    let result = match cli.command {
        Commands::Direct {
            input,
            transcript,
            config,
        } => direct(&input, transcript.as_deref(), config.as_deref(), &stop_rx),
        #[cfg(windows)]
        Commands::Record {
            output,
            interval_ms,
        } => record(&output, interval_ms, stop_rx),
        Commands::InitConfig { force } => init_config(force),
    };
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
