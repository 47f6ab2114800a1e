// pomotune - headless music engine for a pomodoro timer front-end
// Reads JSON commands on stdin, plays the music folder in shuffled order,
// and reports what it is doing as JSON lines on stdout

use anyhow::{Context, Result};
use clap::Parser;
use pomotune::audio::{FileDecoder, OutputDevices, RodioOutput};
use pomotune::protocol::read_commands;
use pomotune::{
    CommandHandler, Config, Driver, Emitter, Event, MusicScanner, PlaybackLoop, Sequencer,
    SharedControl, TrackLoader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tokio::io::BufReader;
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pomotune")]
#[command(about = "Headless music player controlled with JSON over stdin/stdout")]
struct Args {
    /// Output device index to start on (see the `ready` event)
    device: Option<usize>,

    /// Folder to play from, overrides the config file
    #[arg(long)]
    music_dir: Option<PathBuf>,

    /// Alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start playing without waiting for the first toggle
    #[arg(long)]
    autoplay: bool,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,
}

// stdout carries the protocol, so logs go to a file (and stderr in dev mode)
fn init_logging(log_dir: &Path, dev: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(log_dir, "pomotune.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let writer = if dev {
        BoxMakeWriter::new(file_writer.and(std::io::stderr))
    } else {
        BoxMakeWriter::new(file_writer)
    };

    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pomotune=debug"));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(base_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = args.music_dir {
        config.music_directory = dir;
    }
    config.autoplay |= args.autoplay;

    let _guard = init_logging(&config.log_directory, args.dev)?;
    info!(
        "pomotune starting, music from {}",
        config.music_directory.display()
    );
    debug!(?config, "loaded config");

    let control = SharedControl::new(config.playback.volume(), args.device);
    let emitter = Emitter::stdout();
    let output: Arc<dyn OutputDevices> = Arc::new(RodioOutput::new());

    let scanner =
        MusicScanner::new(&config.music_directory).recursive(config.recursive_scan);
    let loader = TrackLoader::new(Arc::new(FileDecoder::new(&config.music_directory)));
    let player = PlaybackLoop::new(control.clone(), emitter.clone(), output.clone(), loader)
        .with_chunk_frames(config.playback.chunk_frames())
        .with_pause_poll(config.playback.pause_poll());
    let mut driver = Driver::new(
        control.clone(),
        emitter.clone(),
        Sequencer::new(scanner),
        player,
    )
    .with_idle_poll(config.playback.idle_poll());

    emitter.emit(Event::Ready {
        devices: output.list(),
        device: control.device(),
    });
    if config.autoplay {
        control.request_play();
    }

    let playback = thread::Builder::new()
        .name("playback".to_string())
        .spawn(move || driver.run())
        .context("spawning playback thread")?;

    let handler = CommandHandler::new(control, emitter, output);
    read_commands(BufReader::new(tokio::io::stdin()), &handler).await;

    let joined = tokio::task::spawn_blocking(move || playback.join()).await?;
    if joined.is_err() {
        error!("Playback thread panicked");
    }

    info!("pomotune stopped");
    Ok(())
}
