use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use geotz::{Config, EngineBuilder, TzError};
use std::path::PathBuf;
use std::process::ExitCode;

/// Bologna, used by `geotz demo`.
const DEMO_POINT: (f64, f64) = (44.4991182, 11.3316855);

#[derive(Parser, Debug)]
#[command(version, about = "Offline coordinate to timezone lookup", long_about = None)]
struct Args {
    /// Directory holding the persisted generation
    #[arg(short, long)]
    cache_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Build from a local dataset file instead of downloading
    #[arg(long)]
    dataset_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the timezone and local time at a coordinate
    Lookup {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lon: f64,
        /// UTC instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Build the generation, replacing any cached one when forced
    Build {
        #[arg(short, long)]
        force: bool,
    },
    /// Print statistics about the cached generation
    Stats {
        /// Also list every timezone id
        #[arg(long)]
        list: bool,
    },
    /// Print Bologna's local time in July and December 2002
    Demo,
}

fn load_config(args: &Args) -> Result<Config, TzError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Config::from_json(&text).map_err(|e| TzError::InvalidConfig(e.to_string()))?
        }
        None => Config::default(),
    };
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

fn builder(args: &Args, config: Config) -> EngineBuilder {
    let builder = EngineBuilder::new().config(config);
    match &args.dataset_file {
        Some(path) => builder.dataset_file(path),
        None => builder,
    }
}

fn parse_instant(at: Option<&str>) -> Result<DateTime<Utc>, TzError> {
    match at {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TzError::InvalidConfig(format!("invalid --at {:?}: {}", text, e))),
        None => Ok(Utc::now()),
    }
}

fn run(args: Args) -> Result<(), TzError> {
    let config = load_config(&args)?;

    match &args.command {
        Command::Lookup { lat, lon, at } => {
            let instant = parse_instant(at.as_deref())?;
            let engine = builder(&args, config).build()?;
            match engine.get_timezone(*lat, *lon)? {
                Some(tzid) => {
                    println!("{}", tzid);
                    println!("{}", engine.formatted_local_time(*lat, *lon, instant)?);
                    println!("{}", engine.zone_offset_string(*lat, *lon, instant)?);
                }
                None => println!("no timezone at ({}, {})", lat, lon),
            }
        }
        Command::Build { force } => {
            let engine = builder(&args, config).force_recompute(*force).build()?;
            let stats = engine.stats();
            match stats.last_build {
                Some(report) => println!(
                    "built {} zones ({} timezones, {} skipped) in {:.1}s",
                    report.zones,
                    report.distinct_timezones,
                    report.skipped,
                    report.elapsed.as_secs_f64()
                ),
                None => println!("generation already present, use --force to rebuild"),
            }
        }
        Command::Stats { list } => {
            let engine = builder(&args, config).open()?;
            let stats = engine.stats();
            println!("zones:     {}", stats.zones);
            println!("timezones: {}", stats.distinct_timezones);
            if let Some(generation) = stats.generation {
                let created: DateTime<Utc> = generation.created_at.into();
                println!("generation {} created {}", generation.id, created.to_rfc3339());
            }
            if *list {
                for tzid in engine.timezones() {
                    println!("{}", tzid);
                }
            }
        }
        Command::Demo => {
            let engine = builder(&args, config).build()?;
            let (lat, lon) = DEMO_POINT;
            let tzid = engine.get_timezone(lat, lon)?.unwrap_or("-");
            for month in [7, 12] {
                let instant = Utc
                    .with_ymd_and_hms(2002, month, 27, 6, 0, 0)
                    .single()
                    .ok_or_else(|| TzError::InvalidConfig("invalid demo instant".to_string()))?;
                println!(
                    "{} {} {}",
                    tzid,
                    engine.formatted_local_time(lat, lon, instant)?,
                    engine.zone_offset_string(lat, lon, instant)?
                );
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("geotz=info"))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
