use packmule::sync::SyncOutcome;

use crate::config::Config;

use super::AppContext;

pub(crate) async fn handle_sync(
    packages: Vec<String>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = AppContext::build(config, database_url).await?;
    let handler = ctx.sync_handler(config);

    let mut failures = 0usize;
    for package in &packages {
        match handler.sync_package(package, false).await {
            Ok(SyncOutcome::Upserted {
                previous_version,
                version_changed,
            }) => {
                if version_changed {
                    println!(
                        "{package}: updated ({} -> new version indexed)",
                        previous_version.as_deref().unwrap_or("?")
                    );
                } else {
                    println!("{package}: indexed");
                }
            }
            Ok(SyncOutcome::Deleted) => {
                println!("{package}: removed from index (gone upstream)");
            }
            Err(err) => {
                failures += 1;
                eprintln!("{package}: failed: {err}");
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {} packages failed to sync", packages.len()).into());
    }
    Ok(())
}
