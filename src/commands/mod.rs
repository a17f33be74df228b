//! CLI command handlers

pub mod inspect;
pub mod run;

pub use inspect::{feed, sources};
pub use run::{fetch, run, tier};

use std::sync::Arc;

use newsloom::adapters::AdapterProvider;
use newsloom::config::Config;
use newsloom::error::{Error, NewsloomErrorTrait, Result};
use newsloom::registry::FileSourceLoader;
use newsloom::scheduler::AdaptiveScheduler;

/// Build and initialize a scheduler over the configured sources file
pub async fn open_scheduler(config: Config) -> Result<AdaptiveScheduler> {
    let sources_path = config.scheduler.sources_path.clone().ok_or_else(|| {
        Error::config("no sources file configured (set scheduler.sources_path or NEWSLOOM_SOURCES)")
    })?;

    let provider = AdapterProvider::new(config.http.clone())?;
    let scheduler = AdaptiveScheduler::new(
        config,
        Arc::new(FileSourceLoader::new(sources_path)),
        Arc::new(provider),
    )?;

    if let Err(e) = scheduler.initialize().await {
        let e = Error::from(e);
        tracing::error!(
            category = %e.category(),
            recoverable = e.is_recoverable(),
            "Scheduler failed to start: {e}"
        );
        return Err(e);
    }

    Ok(scheduler)
}
