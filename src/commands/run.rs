use anyhow::Result;
use std::path::PathBuf;

use newsloom::config::Config;
use newsloom::metrics;
use newsloom::scheduler::{FrequencyTier, ScanReport};

use super::open_scheduler;

/// Run due-scans until Ctrl-C, then optionally dump metrics to `metrics_file`
pub async fn run(config: Config, metrics_file: Option<PathBuf>) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let scheduler = open_scheduler(config).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    let result = scheduler.run(shutdown).await;
    scheduler.close().await;
    result?;

    let summary = scheduler.health_summary();
    tracing::info!(
        active = summary.active,
        warning = summary.warning,
        error = summary.error,
        inactive = summary.inactive,
        "Scheduler stopped"
    );

    if let Some(path) = metrics_file {
        match metrics::write_metrics(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "Metrics snapshot written"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics snapshot"),
        }
    }
    Ok(())
}

/// Fetch one source now
pub async fn fetch(config: Config, id: String, force: bool) -> Result<()> {
    let scheduler = open_scheduler(config).await?;

    let success = scheduler.fetch_source(&id, force).await;
    let items = scheduler.get_items(&id).await;
    let descriptor = scheduler.get_source(&id);
    scheduler.close().await;

    let success = success?;
    println!("Source: {id}");
    println!("Result: {}", if success { "ok" } else { "failed" });
    if let Some(source) = descriptor {
        println!("Status: {}", source.status);
        if let Some(error) = source.last_error {
            println!("Error:  {error}");
        }
        if let Some(ms) = source.last_response_ms {
            println!("Time:   {ms} ms");
        }
    }
    if let Ok(Some(items)) = items {
        println!("Items:  {}", items.len());
    }

    Ok(())
}

/// Fetch every source of one frequency tier
pub async fn tier(config: Config, tier: FrequencyTier) -> Result<()> {
    let scheduler = open_scheduler(config).await?;
    let report = scheduler.fetch_tier(tier).await;
    scheduler.close().await;

    print_report(&format!("{tier} frequency sources"), &report?);
    Ok(())
}

fn print_report(title: &str, report: &ScanReport) {
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    println!("Selected:  {}", report.selected);
    println!("Succeeded: {}", report.succeeded);
    println!("Failed:    {}", report.failed_count());
    for id in &report.failed {
        println!("  - {id}");
    }
    println!("Duration:  {} ms", report.duration_ms);
}
