//! Progress reporting: an indicatif bar on a TTY, structured tracing
//! otherwise.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use packmule::sync::{ProgressCallback, SyncProgress};

/// Build the progress callback for backfill operations.
pub(crate) fn backfill_progress(is_tty: bool) -> ProgressCallback {
    if is_tty {
        interactive_reporter()
    } else {
        logging_reporter()
    }
}

fn logging_reporter() -> ProgressCallback {
    Box::new(|event: SyncProgress| match event {
        SyncProgress::ListingStarted => {
            tracing::info!("Listing all packages");
        }
        SyncProgress::ListedBatch {
            count,
            cumulative,
            estimated_total,
        } => {
            tracing::debug!(count, cumulative, estimated_total, "Listed batch");
        }
        SyncProgress::TickAdvanced {
            offset,
            total,
            rate,
            eta_seconds,
        } => {
            tracing::info!(
                offset,
                total,
                rate = format!("{rate:.1}"),
                eta_seconds = eta_seconds.map(|e| e.round()),
                "Backfill progress"
            );
        }
        SyncProgress::BackfillCompleted { total } => {
            tracing::info!(total, "Backfill completed");
        }
        SyncProgress::PackageSynced {
            name,
            version_changed,
        } => {
            tracing::debug!(package = %name, version_changed, "Package synced");
        }
        SyncProgress::PackageDeleted { name } => {
            tracing::debug!(package = %name, "Package removed from index");
        }
        _ => {}
    })
}

fn interactive_reporter() -> ProgressCallback {
    let bar: Mutex<Option<ProgressBar>> = Mutex::new(None);

    Box::new(move |event: SyncProgress| {
        let mut bar = match bar.lock() {
            Ok(bar) => bar,
            Err(poisoned) => poisoned.into_inner(),
        };

        match event {
            SyncProgress::ListingStarted => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_message("Listing all packages...");
                *bar = Some(spinner);
            }
            SyncProgress::ListedBatch {
                cumulative,
                estimated_total,
                ..
            } => {
                if let Some(bar) = bar.as_ref() {
                    bar.set_message(format!(
                        "Listed {cumulative} packages (~{estimated_total} total)"
                    ));
                    bar.tick();
                }
            }
            SyncProgress::TickAdvanced {
                offset,
                total,
                rate,
                eta_seconds,
            } => {
                let progress = match bar.as_ref() {
                    Some(existing) if existing.length() == Some(total) => existing.clone(),
                    _ => {
                        let fresh = ProgressBar::new(total);
                        if let Ok(style) = ProgressStyle::with_template(
                            "{bar:40.cyan/blue} {pos}/{len} {msg}",
                        ) {
                            fresh.set_style(style);
                        }
                        *bar = Some(fresh.clone());
                        fresh
                    }
                };
                progress.set_position(offset);
                let eta = eta_seconds
                    .map(|e| format!("ETA {}s", e.round() as u64))
                    .unwrap_or_default();
                progress.set_message(format!("{rate:.1} pkg/s {eta}"));
            }
            SyncProgress::BackfillCompleted { total } => {
                if let Some(bar) = bar.take() {
                    bar.finish_with_message(format!("Backfill completed: {total} packages"));
                } else {
                    println!("Backfill completed: {total} packages");
                }
            }
            _ => {}
        }
    })
}
