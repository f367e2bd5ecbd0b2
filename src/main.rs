//! SlopeTrace command line
//!
//! Usage:
//!   slopetrace analyze <FILE> [--json] [--save]
//!   slopetrace replay <FILE> [--json] [--resume]
//!   slopetrace list
//!   slopetrace show <NAME> [--json]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use slopetrace::integrations::NetworkFlag;
use slopetrace::recording::{
    LogStatusPublisher, ManualClock, SessionActor, SessionHandle, SessionServices,
};
use slopetrace::sensors::{ChannelLocationProvider, LocationFix};
use slopetrace::storage::config::{load_config, load_config_from, AppConfig};
use slopetrace::storage::disk::DiskSpaceProbe;
use slopetrace::storage::{list_tracks, load_track, save_track, Database, TrackStore};
use slopetrace::{import_file, Track};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "slopetrace", version)]
#[command(about = "Ski GPS track analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to config.toml in the data directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a GPX or FIT file and print its statistics and runs
    Analyze {
        /// Track file (.gpx or .fit)
        file: PathBuf,

        /// Print the full track as JSON
        #[arg(long)]
        json: bool,

        /// Also store the track in the database
        #[arg(long)]
        save: bool,
    },

    /// Record a session by replaying the fixes of a GPX or FIT file
    Replay {
        /// Track file (.gpx or .fit)
        file: PathBuf,

        /// Print the full track as JSON
        #[arg(long)]
        json: bool,

        /// Continue an interrupted session instead of starting a new one
        #[arg(long)]
        resume: bool,
    },

    /// List stored tracks
    List,

    /// Print a stored track
    Show {
        /// Track name as printed by `list`
        name: String,

        /// Print the full track as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_config().context("Failed to load config")?,
    };

    tracing::debug!("Starting SlopeTrace v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze { file, json, save } => {
            let track = import_file(&file, &config.analysis)
                .with_context(|| format!("Failed to import {}", file.display()))?;

            if save {
                let store = open_store(&config)?;
                let key = save_track(&store, &track).context("Failed to store track")?;
                tracing::info!("Stored as {}", key);
            }

            print_track(&track, json)?;
        }
        Commands::Replay { file, json, resume } => {
            let track = import_file(&file, &config.analysis)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let recorded = runtime.block_on(replay(&config, &track, resume))?;
            print_track(&recorded, json)?;
        }
        Commands::List => {
            let store = open_store(&config)?;
            let names = list_tracks(&store).context("Failed to list tracks")?;
            if names.is_empty() {
                println!("No stored tracks");
            }
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Show { name, json } => {
            let store = open_store(&config)?;
            let Some(track) = load_track(&store, &name).context("Failed to read track")? else {
                bail!("No stored track named '{}'", name);
            };
            print_track(&track, json)?;
        }
    }

    Ok(())
}

/// Feed every point of `source` through a live recording session and return
/// the track it produced.
async fn replay(config: &AppConfig, source: &Track, resume: bool) -> Result<Track> {
    let Some(first) = source.points.first() else {
        bail!("Nothing to replay");
    };

    let store: Arc<dyn TrackStore> = Arc::new(open_store(config)?);
    let clock = Arc::new(ManualClock::new(first.timestamp));
    let services = SessionServices {
        store,
        storage: Arc::new(DiskSpaceProbe::new(config.data_dir.clone())),
        location: Arc::new(ChannelLocationProvider::new()),
        background: None,
        reachability: Arc::new(NetworkFlag::new(true)),
        status: Arc::new(LogStatusPublisher),
        clock: clock.clone(),
    };
    let handle = SessionActor::spawn_configured(config, services);

    if handle.check_for_recovery().await {
        if resume {
            let offer = handle.begin_recovery().await?;
            tracing::info!(
                "Resuming session from {} with {} points",
                offer.started_at,
                offer.point_count
            );
            handle.resume().await?;
        } else {
            tracing::warn!("Discarding interrupted session (pass --resume to continue it)");
            handle.start().await?;
        }
    } else {
        handle.start().await?;
    }

    for point in &source.points {
        clock.set(point.timestamp);
        handle.push_fix(LocationFix::new(
            point.latitude,
            point.longitude,
            point.elevation,
            5.0,
            point.timestamp,
        ));
    }

    if config.geocoding.enabled {
        wait_for_place(&handle, config.geocoding.timeout()).await;
    }

    let outcome = handle.stop().await.context("Session ended without data")?;
    handle.shutdown();
    match &outcome.stored_as {
        Some(key) => tracing::info!("Stored as {}", key),
        None => tracing::warn!("Track was not stored; the autosave snapshot is kept"),
    }
    Ok(outcome.track)
}

/// Give the place lookup up to `timeout` to name the session.
async fn wait_for_place(handle: &SessionHandle, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        match handle.status().await {
            Some(status) if status.location_name.is_none() => {
                tokio::time::sleep(Duration::from_millis(100)).await
            }
            _ => return,
        }
    }
}

fn open_store(config: &AppConfig) -> Result<impl TrackStore> {
    let path = config.database_path();
    let db = Database::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Mutex::new(db))
}

fn print_track(track: &Track, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(track)?);
        return Ok(());
    }

    let s = &track.stats;
    println!("{}", track.name);
    println!("  Points:        {}", track.points.len());
    println!("  Duration:      {}", format_duration(s.duration_s));
    println!("  Distance:      {:.2} km", s.total_distance_m / 1000.0);
    println!(
        "  Ascent/Descent: {:.0} m / {:.0} m",
        s.total_ascent_m, s.total_descent_m
    );
    println!(
        "  Altitude:      {:.0} - {:.0} m",
        s.min_altitude_m, s.max_altitude_m
    );
    println!(
        "  Speed:         avg {:.1} km/h, max {:.1} km/h",
        s.avg_speed_kmh, s.max_speed_kmh
    );
    if let (Some(avg), Some(max)) = (s.avg_heart_rate, s.max_heart_rate) {
        println!("  Heart rate:    avg {:.0} bpm, max {} bpm", avg, max);
    }
    println!(
        "  Skiing:        {} runs, {:.2} km, {:.0} m vertical, {}",
        s.run_count,
        s.ski_distance_m / 1000.0,
        s.ski_vertical_m,
        format_duration(s.ski_duration_s)
    );

    if !track.runs.is_empty() {
        println!();
        println!(
            "  {:>3}  {:>8}  {:>9}  {:>8}  {:>9}  {:>9}  {:>6}",
            "Run", "Start", "Distance", "Vertical", "Avg km/h", "Max km/h", "Slope"
        );
        for run in &track.runs {
            println!(
                "  {:>3}  {:>8}  {:>7.0} m  {:>6.0} m  {:>9.1}  {:>9.1}  {:>5.1}°",
                run.id,
                run.start_time.format("%H:%M:%S"),
                run.distance_m,
                run.vertical_drop_m,
                run.avg_speed_kmh,
                run.max_speed_kmh,
                run.avg_slope_deg
            );
        }
    }

    Ok(())
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
