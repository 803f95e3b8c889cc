//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the daily
//! crawl of the closed-auctions listing.

use kvd_scraper::CrawlRange;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::api::AppState;
use crate::crawl::{run_crawl, CrawlError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the crawl job's cron expression is rejected, or the scheduler fails to
/// start.
pub async fn build_scheduler(state: AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_crawl_job(&scheduler, state).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the daily full crawl on `KVD_CRAWL_SCHEDULE` (UTC).
async fn register_crawl_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let schedule = state.config.crawl_schedule.clone();

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let state = state.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting daily crawl");
            match run_crawl(&state, CrawlRange::all()).await {
                Ok(summary) => tracing::info!(
                    processed_urls = summary.processed_urls,
                    persisted = summary.persisted,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "scheduler: daily crawl complete"
                ),
                Err(CrawlError::Busy) => {
                    tracing::warn!("scheduler: crawl already running; skipping this run");
                }
                Err(e) => tracing::error!(error = %e, "scheduler: daily crawl failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule = %schedule, "scheduler: daily crawl registered");
    Ok(())
}
