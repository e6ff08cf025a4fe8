use crate::nudge_logic::config::Config;
use crate::nudge_logic::state::AppState;
use anyhow::anyhow;
use chrono::{DateTime, FixedOffset};
use lib_common::core::{ContextSource, DispatchSummary};
use std::sync::Arc;
use tokio_cron_scheduler::{JobBuilder, JobScheduler};
use tracing::{debug, error, info, warn};

/// Starts the cron job that evaluates and dispatches nudges for every user.
///
/// The returned scheduler must be shut down on exit.
pub async fn start(
    config: &Config,
    state: AppState,
    source: Arc<dyn ContextSource>,
) -> anyhow::Result<JobScheduler> {
    let schedule = config.schedule();
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("Failed to create scheduler: {:?}", e))?;

    let job = JobBuilder::new()
        .with_timezone(state.timezone)
        .with_cron_job_type()
        .with_schedule(schedule.as_str())
        .map_err(|e| anyhow!("Invalid schedule '{}': {:?}", schedule, e))?
        .with_run_async(Box::new(move |uuid, mut l| {
            let state = state.clone();
            let source = Arc::clone(&source);
            Box::pin(async move {
                let now = state.now();
                run_tick(&state, source, now).await;
                match l.next_tick_for_job(uuid).await {
                    Ok(Some(ts)) => debug!("Next nudge tick at {:?}", ts),
                    _ => warn!("Could not get next tick for nudge job"),
                }
            })
        }))
        .build()
        .map_err(|e| anyhow!("Failed to build nudge job: {:?}", e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow!("Failed to add nudge job: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow!("Failed to start scheduler: {:?}", e))?;

    info!("Nudge scheduler started with schedule '{}'", schedule);
    Ok(scheduler)
}

/// One evaluation pass at `now`: load snapshots, stamp the clock, dispatch.
///
/// Failures are logged and end the tick early; the next tick tries again.
pub async fn run_tick(
    state: &AppState,
    source: Arc<dyn ContextSource>,
    now: DateTime<FixedOffset>,
) -> Option<DispatchSummary> {
    let snapshots = match tokio::task::spawn_blocking(move || source.snapshots()).await {
        Ok(Ok(snapshots)) => snapshots,
        Ok(Err(e)) => {
            warn!("Skipping nudge tick: {}", e);
            return None;
        }
        Err(e) => {
            error!("Snapshot loader task failed: {}", e);
            return None;
        }
    };

    let summary = state.dispatcher.run_all(&snapshots, now);
    info!(
        users = summary.users,
        triggered = summary.triggered,
        suppressed = summary.suppressed,
        delivered = summary.delivered,
        stored = summary.stored,
        "Nudge tick complete"
    );
    Some(summary)
}
