use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use console::Term;

use packmule::entity::prelude::BackfillStatus;
use packmule::sync::{
    BackfillOrchestrator, DbStateStore, JobHandler, JobQueue, PipelineHandler,
};

use crate::config::Config;
use crate::{BackfillAction, progress, shutdown};

use super::AppContext;

pub(crate) async fn handle_backfill(
    action: BackfillAction,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = AppContext::build(config, database_url).await?;

    let orchestrator = Arc::new(
        BackfillOrchestrator::new(
            DbStateStore::new(ctx.db.clone()),
            Arc::clone(&ctx.queue) as Arc<dyn JobQueue>,
            Arc::clone(&ctx.client),
        )
        .with_batch_size(config.sync.batch_size)
        .with_page_size(config.sync.page_size)
        .with_tick_interval(Duration::from_secs(config.sync.tick_interval_secs))
        .with_progress(progress::backfill_progress(Term::stdout().is_term())),
    );

    match action {
        BackfillAction::Start => {
            orchestrator.start().await?;
            drive(&ctx, &orchestrator, config).await;
        }
        BackfillAction::Resume => {
            orchestrator.resume().await?;
            drive(&ctx, &orchestrator, config).await;
        }
        BackfillAction::Pause => {
            orchestrator.pause().await?;
            println!("Backfill paused.");
        }
        BackfillAction::Reset => {
            orchestrator.reset().await?;
            println!("Backfill reset to idle.");
        }
        BackfillAction::Status => {
            print_status(&orchestrator).await?;
        }
        BackfillAction::Tick => {
            let outcome = orchestrator.tick().await?;
            println!("Tick outcome: {outcome:?}");
        }
    }

    Ok(())
}

/// Run the in-process workers until the backfill reaches a terminal state
/// and the queue drains, or shutdown is requested.
async fn drive(
    ctx: &AppContext,
    orchestrator: &Arc<BackfillOrchestrator<DbStateStore>>,
    config: &Config,
) {
    // Resumability also covers the case where a previous process died
    // with a running status and no tick in this (fresh) queue.
    if let Err(err) = orchestrator.recover_on_startup().await {
        tracing::warn!(error = %err, "Startup recovery check failed");
    }

    let handler: Arc<dyn JobHandler> = Arc::new(
        PipelineHandler::new(ctx.sync_handler(config))
            .with_backfill(Arc::clone(orchestrator))
            .with_delivery(ctx.delivery_worker()),
    );

    let shutdown_flag = shutdown::shutdown_flag();
    let workers = ctx.queue.spawn_workers(
        handler,
        config.sync.worker_concurrency,
        Arc::clone(&shutdown_flag),
    );

    loop {
        if shutdown::is_shutdown_requested() {
            println!("Stopping; progress is persisted and `backfill resume` continues.");
            break;
        }

        let state = match orchestrator.status().await {
            Ok(state) => state,
            Err(err) => {
                tracing::error!(error = %err, "Status check failed");
                break;
            }
        };

        let terminal = matches!(
            state.status,
            BackfillStatus::Completed | BackfillStatus::Error | BackfillStatus::Idle
        );
        if terminal && ctx.queue.is_empty().await {
            if state.status == BackfillStatus::Error {
                eprintln!(
                    "Backfill failed: {}",
                    state.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            break;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    shutdown_flag.store(true, Ordering::Release);
    for worker in workers {
        let _ = worker.await;
    }
}

async fn print_status(
    orchestrator: &Arc<BackfillOrchestrator<DbStateStore>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = orchestrator.status().await?;

    println!("Status:   {}", state.status);
    println!("Progress: {}/{}", state.offset, state.total);
    if let Some(started_at) = state.started_at {
        println!("Started:  {started_at}");
    }
    if state.rate > 0.0 {
        println!("Rate:     {:.1} packages/sec", state.rate);
    }
    if let Some(eta) = state.eta_seconds() {
        println!("ETA:      {}s", eta.round() as u64);
    }
    if let Some(error) = &state.error_message {
        println!("Error:    {error}");
    }

    Ok(())
}
