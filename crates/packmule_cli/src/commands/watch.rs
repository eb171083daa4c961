use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;

use packmule::registry::ChangeFeed;
use packmule::sync::{
    DbStateStore, JobHandler, JobOptions, JobPayload, JobQueue, PipelineHandler,
};

use crate::config::Config;
use crate::shutdown;

use super::AppContext;

pub(crate) async fn handle_watch(
    since: u64,
    once: bool,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = AppContext::build(config, database_url).await?;

    let handler: Arc<dyn JobHandler> = Arc::new(
        PipelineHandler::<DbStateStore>::new(ctx.sync_handler(config))
            .with_delivery(ctx.delivery_worker()),
    );

    let feed = ChangeFeed::new((*ctx.client).clone(), since)
        .with_backoff(config.feed.backoff())
        .with_page_limit(config.feed.page_limit)
        .with_poll_interval(config.feed.poll_interval());

    if once {
        return poll_once(feed, &ctx, handler.as_ref()).await;
    }

    follow(feed, &ctx, handler, config).await
}

/// One poll: enqueue whatever arrived, process it, print the new cursor.
async fn poll_once(
    mut feed: ChangeFeed,
    ctx: &AppContext,
    handler: &dyn JobHandler,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = feed.poll_once().await?;
    let count = events.len();

    for event in events {
        ctx.queue
            .enqueue(
                JobPayload::PackageSync {
                    name: event.name,
                    seq: Some(event.seq),
                    deleted: event.deleted,
                },
                JobOptions::default(),
            )
            .await?;
    }

    let processed = ctx.queue.run_until_idle(handler).await;
    println!("Processed {processed} jobs from {count} change events.");
    println!("Next cursor: {}", feed.cursor());
    Ok(())
}

/// Follow the feed until Ctrl+C; the final cursor is printed for resuming.
async fn follow(
    feed: ChangeFeed,
    ctx: &AppContext,
    handler: Arc<dyn JobHandler>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown_flag = shutdown::shutdown_flag();
    let workers = ctx.queue.spawn_workers(
        handler,
        config.sync.worker_concurrency,
        Arc::clone(&shutdown_flag),
    );

    let (event_tx, mut event_rx) = mpsc::channel(512);
    let feed_handle = tokio::spawn(feed.run(event_tx));

    let mut last_seq = 0u64;
    let result = loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        last_seq = last_seq.max(event.seq);
                        ctx.queue
                            .enqueue(
                                JobPayload::PackageSync {
                                    name: event.name,
                                    seq: Some(event.seq),
                                    deleted: event.deleted,
                                },
                                JobOptions::default(),
                            )
                            .await?;
                    }
                    // Sender dropped: the feed task ended, fatally or not.
                    None => break feed_handle.await?,
                }
            }

            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if shutdown::is_shutdown_requested() {
                    feed_handle.abort();
                    break Ok(());
                }
            }
        }
    };

    shutdown_flag.store(true, Ordering::Release);
    for worker in workers {
        let _ = worker.await;
    }

    if last_seq > 0 {
        println!("Last processed sequence: {last_seq} (resume with --since {last_seq})");
    }

    // A fatal feed error (retries exhausted) must reach the supervisor.
    result.map_err(Into::into)
}
