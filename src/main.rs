use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use healthtrend::config::AppConfig;
use healthtrend::dashboard::{ChartMetric, DashboardSnapshot, MetricChart};
use healthtrend::import::{read_csv_observations, read_sleep_payload};
use healthtrend::logging::init_logging;
use healthtrend::normalize::parse_calendar_date;
use healthtrend::{ChartOutcome, ChartSeries, ComparisonChart, DateWindow, HealthError};

/// HealthTrend - personal health trend analysis
///
/// Merges sleep, running and fitness-test exports into daily series and
/// reports summary cards and chart-ready trends over a date range.
#[derive(Parser)]
#[command(name = "healthtrend")]
#[command(version)]
#[command(about = "Personal health trend analysis", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Sleep payload (JSON), overrides the config file
    #[arg(long, value_name = "FILE", global = true)]
    sleep: Option<PathBuf>,

    /// Activity log export (CSV), overrides the config file
    #[arg(long, value_name = "FILE", global = true)]
    activities: Option<PathBuf>,

    /// Fitness test export (CSV), overrides the config file
    #[arg(long, value_name = "FILE", global = true)]
    fitness: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the summary cards over the full history
    Summary,

    /// Render one chart over a date range
    Chart {
        /// hrv, performance, vo2max, total-sleep, deep-vs-rem, deep-sleep, rem-sleep
        #[arg(short, long)]
        metric: ChartMetric,

        /// Date range start (YYYY-MM-DD), default first recorded day
        #[arg(short, long)]
        from: Option<String>,

        /// Date range end (YYYY-MM-DD), default last recorded day
        #[arg(short, long)]
        to: Option<String>,

        /// Print the chart payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or create the configuration file
    Config {
        /// Print the effective configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

#[derive(Tabled)]
struct CardRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Days")]
    days: usize,
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Trend")]
    trend: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(),
    };

    let level = config.logging.level.raised_by(cli.verbose);
    init_logging(&config.logging.clone().with_level(level))?;

    if cli.sleep.is_some() {
        config.sources.sleep = cli.sleep.clone();
    }
    if cli.activities.is_some() {
        config.sources.activities = cli.activities.clone();
    }
    if cli.fitness.is_some() {
        config.sources.fitness = cli.fitness.clone();
    }

    match cli.command {
        Commands::Summary => {
            let snapshot = load_snapshot(&config)?;
            print_summary(&snapshot);
        }

        Commands::Chart {
            metric,
            from,
            to,
            json,
        } => {
            let snapshot = load_snapshot(&config)?;
            let window = resolve_window(&snapshot, from.as_deref(), to.as_deref())?;
            let chart = snapshot.chart(metric, window.as_ref());

            if json {
                println!("{}", serde_json::to_string_pretty(&chart)?);
            } else {
                print_chart(metric, window, &chart);
            }
        }

        Commands::Config { show, init } => {
            if init {
                if config_path.exists() {
                    bail!("Config file already exists: {}", config_path.display());
                }
                AppConfig::default().save_to_file(&config_path)?;
                println!(
                    "{}",
                    format!("✓ Wrote default config to {}", config_path.display()).green()
                );
            }
            if show || !init {
                println!("{}", format!("# {}", config_path.display()).dimmed());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn require<'a>(path: &'a Option<PathBuf>, what: &str, flag: &str) -> Result<&'a Path> {
    match path {
        Some(path) => Ok(path.as_path()),
        None => bail!(
            "No {} file configured. Pass {} or set it under [sources] in the config file.",
            what,
            flag
        ),
    }
}

fn load_snapshot(config: &AppConfig) -> Result<DashboardSnapshot> {
    let sleep_path = require(&config.sources.sleep, "sleep", "--sleep")?;
    let activities_path = require(&config.sources.activities, "activity log", "--activities")?;
    let fitness_path = require(&config.sources.fitness, "fitness test", "--fitness")?;

    let sleep = read_sleep_payload(sleep_path).map_err(report)?;
    let activities = read_csv_observations(activities_path).map_err(report)?;
    let fitness = read_csv_observations(fitness_path).map_err(report)?;

    DashboardSnapshot::from_observations(&sleep, &activities, &fitness, config)
        .map_err(report)
        .context("Failed to build dashboard")
}

/// Print the user-facing message, keep the full error for the exit status
fn report(err: HealthError) -> anyhow::Error {
    eprintln!("{} {}", "✗".red().bold(), err.user_message().red());
    err.into()
}

fn resolve_window(
    snapshot: &DashboardSnapshot,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Option<DateWindow>> {
    if from.is_none() && to.is_none() {
        return Ok(None);
    }
    let parse = |text: &str| {
        parse_calendar_date(text).with_context(|| format!("Invalid date: {}", text))
    };

    let full = snapshot
        .full_window()
        .context("No ingested data to select a range from")?;
    let start = from.map(parse).transpose()?.unwrap_or(full.start);
    let end = to.map(parse).transpose()?.unwrap_or(full.end);
    Ok(Some(DateWindow::new(start, end)))
}

fn print_summary(snapshot: &DashboardSnapshot) {
    println!("{}", "Health summary".blue().bold());
    if let Some(window) = snapshot.full_window() {
        println!("  History: {} to {}", window.start, window.end);
    }

    let rows: Vec<CardRow> = snapshot
        .cards()
        .all()
        .iter()
        .map(|card| CardRow {
            name: card.name.clone(),
            value: card.display(),
            days: card.count,
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_chart(metric: ChartMetric, window: Option<DateWindow>, chart: &MetricChart) {
    println!("{}", metric.title().blue().bold());
    match window {
        Some(window) => println!("  Range: {} to {}", window.start, window.end),
        None => println!("  Range: full history"),
    }

    match chart {
        MetricChart::Series(ChartOutcome::Rendered(series)) => print_series(series),
        MetricChart::Comparison(ChartOutcome::Rendered(comparison)) => {
            print_comparison(comparison)
        }
        other => {
            if let Some(message) = other.message() {
                println!("{}", message.yellow());
            }
        }
    }
}

fn print_series(series: &ChartSeries) {
    let rows: Vec<PointRow> = series
        .x
        .iter()
        .zip(&series.point_labels)
        .zip(&series.trend.points)
        .map(|((date, label), trend)| PointRow {
            date: date.to_string(),
            value: label.clone(),
            trend: format!("{:.3}", trend),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let direction = if series.trend.slope > 0.0 {
        "rising".green()
    } else if series.trend.slope < 0.0 {
        "falling".red()
    } else {
        "flat".normal()
    };
    println!(
        "  Mean: {:.3}   Trend: {} ({:+.5} per day)",
        series.mean, direction, series.trend.slope
    );
    if let Some(ticks) = &series.ticks {
        let labels: Vec<&str> = ticks.iter().map(|t| t.label.as_str()).collect();
        println!("  Axis: {}", labels.join("  ").dimmed());
    }
}

fn print_comparison(chart: &ComparisonChart) {
    for overlay in &chart.series {
        println!(
            "  {}: {} days, mean {}",
            overlay.name.bold(),
            overlay.y.len(),
            healthtrend::duration::format_hhmm(overlay.mean)
        );
        let rows: Vec<PointRow> = chart
            .x
            .iter()
            .zip(&overlay.point_labels)
            .map(|(date, label)| PointRow {
                date: date.to_string(),
                value: label.clone(),
                trend: String::new(),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    let labels: Vec<&str> = chart.ticks.iter().map(|t| t.label.as_str()).collect();
    println!("  Axis: {}", labels.join("  ").dimmed());
}
