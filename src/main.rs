//! CLI entry point for the Warsaw GTFS-Realtime producer.
//!
//! Provides subcommands for publishing service alerts, building the brigade
//! assignment table from the static schedule, and polling live vehicle
//! positions into a vehicle-positions feed.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Europe::Warsaw;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use warsaw_gtfs_rt::{
    alerts::{
        AlertEffect, CHANGES_FEED_URL, DISRUPTIONS_FEED_URL, build_alerts, line_tokens,
        normalize_lines, page, rss,
    },
    brigades::{AssignmentTable, build_assignments},
    config::Config,
    fetch::{BasicClient, fetch_bytes, fetch_source},
    matcher::{Decisions, MatchConfig, VehicleDecision, match_cycle},
    output::{AlertsMirror, VehiclesMirror, alerts_feed, vehicles_feed, write_feed, write_json},
    schedule::{IndexOptions, ScheduleIndex, archive::read_archive},
    upstream::{WarsawApi, collect_vehicles},
};

#[derive(Parser)]
#[command(name = "warsaw-gtfs-rt")]
#[command(about = "GTFS-Realtime feeds for Warsaw public transport", long_about = None)]
struct Cli {
    /// Warsaw open-data API key
    #[arg(short, long, global = true, env = "WARSAW_API_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Directory for generated files (defaults to OUTPUT_DIR or output-rt)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct Formats {
    /// Also write a JSON mirror of the feed
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Skip the protobuf feed
    #[arg(long, default_value_t = false)]
    no_protobuf: bool,
}

impl Formats {
    fn protobuf(self) -> bool {
        !self.no_protobuf
    }

    fn check(self) -> Result<()> {
        if !self.json && !self.protobuf() {
            bail!("No output format selected: drop --no-protobuf or add --json");
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Publish ZTM service alerts
    Alerts {
        #[command(flatten)]
        formats: Formats,
    },
    /// Build brigades.json from the static GTFS schedule
    Brigades {
        /// GTFS archive file or URL (defaults to GTFS_URL)
        #[arg(long, value_name = "FILE_OR_URL")]
        gtfs: Option<String>,

        /// Service date to build for, YYYYMMDD (defaults to today in Warsaw)
        #[arg(long, value_parser = parse_service_date)]
        date: Option<NaiveDate>,
    },
    /// Poll vehicle positions and match them to trips
    Positions {
        /// brigades.json file or URL (defaults to BRIGADES_URL)
        #[arg(long, value_name = "FILE_OR_URL")]
        brigades: Option<String>,

        /// File carrying decisions between runs; loaded if present, saved after each poll
        #[arg(long)]
        previous: Option<PathBuf>,

        #[command(flatten)]
        formats: Formats,

        /// Seconds between polls
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Number of polls (0 = forever)
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

fn parse_service_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|e| format!("{value}: {e}"))
}

/// Current wall-clock time in Warsaw.
fn warsaw_now() -> NaiveDateTime {
    Utc::now().with_timezone(&Warsaw).naive_local()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(key) = cli.key {
        config.api_key = Some(key);
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = config
        .log_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = config
        .log_file_path
        .file_name()
        .unwrap_or(OsStr::new("warsaw_gtfs_rt.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    match cli.command {
        Commands::Alerts { formats } => {
            formats.check()?;
            publish_alerts(&config, formats).await?;
        }
        Commands::Brigades { gtfs, date } => {
            let gtfs = gtfs.unwrap_or_else(|| config.gtfs_url.clone());
            let date = date.unwrap_or_else(|| warsaw_now().date());
            create_brigades(&config, &gtfs, date).await?;
        }
        Commands::Positions {
            brigades,
            previous,
            formats,
            interval,
            count,
        } => {
            formats.check()?;
            let brigades = brigades.unwrap_or_else(|| config.brigades_url.clone());
            poll_positions(&config, &brigades, previous.as_deref(), formats, interval, count)
                .await?;
        }
    }

    Ok(())
}

/// Reads both alert feeds, disruptions first, and writes `alerts.*`.
#[tracing::instrument(skip_all)]
async fn publish_alerts(config: &Config, formats: Formats) -> Result<()> {
    let client = BasicClient::new();

    let mut entries = Vec::new();
    for (url, effect) in [
        (DISRUPTIONS_FEED_URL, AlertEffect::ReducedService),
        (CHANGES_FEED_URL, AlertEffect::ModifiedService),
    ] {
        let bytes = fetch_bytes(&client, url)
            .await
            .with_context(|| format!("Failed to download alert feed {url}"))?;
        let items = rss::parse_items(&String::from_utf8_lossy(&bytes), effect);
        info!(url, items = items.len(), "Alert feed read");
        entries.extend(items);
    }

    let mut descriptions = HashMap::new();
    for entry in &entries {
        if descriptions.contains_key(&entry.link)
            || normalize_lines(line_tokens(&entry.title)).is_empty()
        {
            continue;
        }
        let description = page::describe(&client, &entry.link).await;
        descriptions.insert(entry.link.clone(), description);
    }

    let alerts = build_alerts(&entries, |entry| descriptions.get(&entry.link).cloned());
    info!(entries = entries.len(), alerts = alerts.len(), "Alerts built");

    let now = warsaw_now();
    if formats.protobuf() {
        write_feed(&config.output_dir, "alerts", &alerts_feed(&alerts, now))?;
    }
    if formats.json {
        let mirror = AlertsMirror::new(&alerts, now);
        write_json(config.output_dir.join("alerts.json"), &mirror)?;
    }

    Ok(())
}

/// Builds the assignment table for `date` and writes `brigades.json`.
#[tracing::instrument(skip(config))]
async fn create_brigades(config: &Config, gtfs: &str, date: NaiveDate) -> Result<()> {
    let api_key = config.require_api_key()?.to_string();
    let client = BasicClient::new();

    let archive = fetch_source(&client, gtfs).await?;
    let feed = read_archive(&archive, date)?;
    let index = ScheduleIndex::build(&feed, &IndexOptions::default());
    info!(
        pairs = index.pair_count(),
        trips = index.trip_count(),
        "Schedule indexed"
    );

    let api = WarsawApi::new(client, api_key);
    let report = build_assignments(index, &api).await;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
    let path = config.output_dir.join("brigades.json");
    report.table.save(&path)?;
    info!(
        path = %path.display(),
        api_calls = report.api_calls,
        failed = report.failed.len(),
        "Brigades written"
    );

    Ok(())
}

/// Polls telemetry `count` times (0 = forever), publishing `vehicles.*`
/// after each poll.
#[tracing::instrument(skip(config, formats))]
async fn poll_positions(
    config: &Config,
    brigades: &str,
    previous: Option<&Path>,
    formats: Formats,
    interval: u64,
    count: usize,
) -> Result<()> {
    let api_key = config.require_api_key()?.to_string();
    let client = BasicClient::new();

    let table = AssignmentTable::from_json(&fetch_source(&client, brigades).await?)?;
    info!(
        routes = table.route_count(),
        brigades = table.brigade_count(),
        "Brigades loaded"
    );

    let mut decisions = match previous {
        Some(path) if path.exists() => Decisions::load(path)?,
        _ => Decisions::new(),
    };

    let api = WarsawApi::new(client, api_key);
    let match_config = MatchConfig::default();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    if count == 0 {
        info!(interval, "Polling forever. Press Ctrl+C to stop.");
    }

    let mut polls = 0usize;
    while count == 0 || polls < count {
        ticker.tick().await;
        polls += 1;

        let reports = collect_vehicles(&api).await;
        let now = warsaw_now();
        let matched = match_cycle(&reports, &table, &decisions, now, &match_config);
        info!(
            poll = polls,
            reports = reports.len(),
            matched = matched.len(),
            "Positions matched"
        );

        // A failed write leaves the previous files in place until the next poll
        if let Err(e) = publish_vehicles(&config.output_dir, formats, &matched, now) {
            error!(poll = polls, error = %e, "Failed to publish vehicle positions");
        }

        decisions = decisions.merge(matched);
        if let Some(path) = previous {
            if let Err(e) = decisions.save(path) {
                error!(poll = polls, path = %path.display(), error = %e, "Failed to save decisions");
            }
        }
    }

    Ok(())
}

/// Writes `vehicles.pb`/`.pbn` and, when asked, `vehicles.json`.
fn publish_vehicles(
    output_dir: &Path,
    formats: Formats,
    matched: &[VehicleDecision],
    now: NaiveDateTime,
) -> Result<()> {
    if formats.protobuf() {
        write_feed(output_dir, "vehicles", &vehicles_feed(matched, now))?;
    }
    if formats.json {
        let mirror = VehiclesMirror::new(matched, now);
        write_json(output_dir.join("vehicles.json"), &mirror)?;
    }
    Ok(())
}
