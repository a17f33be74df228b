use anyhow::Result;

use newsloom::config::Config;
use newsloom::utils::truncate_text;

use super::open_scheduler;

/// Print the source registry with health and cache state
pub async fn sources(config: Config) -> Result<()> {
    let scheduler = open_scheduler(config).await?;

    println!(
        "{:<20} {:<8} {:>8} {:>8} {:>5} {:<9} {:>7}",
        "ID", "FAMILY", "INTERVAL", "TTL", "PRIO", "STATUS", "CACHED"
    );
    for source in scheduler.get_all_sources() {
        let cached = match scheduler.get_items(&source.id).await {
            Ok(Some(items)) => items.len().to_string(),
            _ => "-".to_string(),
        };
        let family = scheduler
            .source_config(&source.id)
            .map(|config| config.adapter.family().to_string())
            .unwrap_or_default();
        println!(
            "{:<20} {:<8} {:>8} {:>8} {:>5} {:<9} {:>7}",
            truncate_text(&source.id, 20),
            family,
            source.update_interval,
            source.cache_ttl,
            source.priority,
            source.status,
            cached
        );
    }

    scheduler.close().await;
    Ok(())
}

/// Print the merged feed of cached items
pub async fn feed(config: Config, limit: usize) -> Result<()> {
    let scheduler = open_scheduler(config).await?;
    let items = scheduler.feed(limit).await;
    scheduler.close().await;

    let items = items?;
    if items.is_empty() {
        println!("No cached items. Run `newsloom fetch <id>` or `newsloom run` first.");
        return Ok(());
    }

    for item in items {
        let published = item
            .published_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".repeat(16));
        println!(
            "{published}  [{}] {}",
            item.source_id,
            truncate_text(&item.title, 80)
        );
        println!("{:18}{}", "", item.url);
    }
    Ok(())
}
