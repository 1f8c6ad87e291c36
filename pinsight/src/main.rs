//! pinsight - usage analytics summary CLI
//!
//! Runs "get summary" against the event store and prints the result as a
//! terminal report or as JSON.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pinsight_core::analytics::{ErrorPayload, Summary, SummaryService, SyncSummaryService};
use pinsight_core::Config;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "pinsight")]
#[command(about = "Usage analytics summary for the event store")]
#[command(version)]
struct Args {
    /// Path to the event database (default: configured or XDG data dir)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Trailing window for the events-over-time series, in days
    #[arg(long)]
    window_days: Option<u32>,

    /// Only count events at or before the moment the request starts
    #[arg(long)]
    snapshot: bool,

    /// Deadline for the whole summary, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    let log_guard = pinsight_core::logging::init(&config.logging).ok();

    if let Some(path) = &args.database {
        config.store.path = Some(path.clone());
    }
    if let Some(days) = args.window_days {
        config.summary.window_days = days;
    }
    if let Some(ms) = args.deadline_ms {
        config.summary.deadline_ms = ms;
    }
    if args.snapshot {
        config.summary.consistent_snapshot = true;
    }

    let service = SummaryService::from_config(&config).context("invalid configuration")?;
    let mut service = SyncSummaryService::new(service).context("failed to start runtime")?;

    let result = service.get_summary();
    service.shutdown();

    match (result, args.format) {
        (Ok(summary), Format::Json) => print_json(&summary)?,
        (Ok(summary), Format::Text) => print_terminal(&summary),
        (Err(e), Format::Json) => {
            tracing::error!(error = %e, "get summary failed");
            let payload = ErrorPayload::from_error(&e);
            println!("{}", serde_json::to_string_pretty(&payload)?);
            drop(log_guard);
            std::process::exit(1);
        }
        (Err(e), Format::Text) => {
            return Err(e).context(ErrorPayload::MESSAGE);
        }
    }

    Ok(())
}

fn print_json(summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
    println!("{}", json);
    Ok(())
}

fn print_terminal(summary: &Summary) {
    println!();
    println!("╭{}╮", "─".repeat(60));
    println!("│{:^60}│", "Usage Summary");
    println!("╰{}╯", "─".repeat(60));
    println!();

    if summary.total_events() == 0 {
        println!("  No events recorded yet.");
        println!();
        return;
    }

    let retention = &summary.user_retention;
    println!("OVERVIEW");
    println!(
        "   Events: {:<12} Users: {}",
        summary.total_events(),
        retention.total_users
    );
    println!(
        "   Events/user: {:<7} Event types/user: {:<6} Days active: {}",
        retention.avg_events_per_user,
        retention.avg_unique_event_types,
        retention.avg_days_active
    );
    println!();

    println!("EVENT TYPES");
    for row in &summary.event_types_distribution {
        println!(
            "   {:<28} {:>8} events  {:>6} users",
            row.name, row.value, row.unique_users
        );
    }
    println!();

    if !summary.events_over_time.is_empty() {
        println!("LAST DAYS");
        let max = summary
            .events_over_time
            .iter()
            .map(|r| r.count)
            .max()
            .unwrap_or(1)
            .max(1);
        for row in &summary.events_over_time {
            println!(
                "   {}  {:<30} {:>6} ({} users)",
                row.date,
                bar(row.count, max, 30),
                row.count,
                row.unique_users
            );
        }
        println!();
    }

    println!("BY HOUR (UTC)");
    let max = summary
        .user_activity_by_hour
        .iter()
        .map(|r| r.count)
        .max()
        .unwrap_or(1)
        .max(1);
    for row in &summary.user_activity_by_hour {
        println!(
            "   {:02}:00  {:<30} {:>6}",
            row.hour,
            bar(row.count, max, 30),
            row.count
        );
    }
    println!();

    println!("SUBSCRIPTION STATUS");
    for row in &summary.subscription_status {
        let trial = row
            .avg_days_in_trial
            .map(|d| format!("{d} trial days avg"))
            .unwrap_or_default();
        println!(
            "   {:<16} {:>8} events  {:>6} users  {}",
            row.status, row.count, row.unique_users, trial
        );
    }
    println!();

    println!("PLATFORMS");
    for row in &summary.platform_engagement {
        println!(
            "   {:<16} {:>8} events  {:>6} users  {:>3} browsers  {:>3} devices",
            row.platform, row.count, row.unique_users, row.browser_count, row.device_count
        );
    }
    println!();

    println!("FEATURES BY PLAN");
    for row in &summary.feature_usage_by_subscription {
        println!(
            "   {:<28} {:<10} {:>8} events  {:>6} users",
            row.event_type, row.subscription_type, row.count, row.unique_users
        );
    }
    println!();

    println!("ENVIRONMENTS");
    for row in &summary.environment_engagement {
        println!(
            "   {:<16} {:>8} events  {:>6} users  {} events/user",
            row.environment, row.count, row.unique_users, row.avg_events_per_user
        );
    }
    println!();
}

/// Horizontal bar scaled against `max`
fn bar(value: i64, max: i64, width: usize) -> String {
    let filled = ((value as f64 / max as f64) * width as f64).round() as usize;
    "█".repeat(filled.min(width))
}
