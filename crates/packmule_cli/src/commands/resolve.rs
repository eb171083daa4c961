use std::sync::Arc;
use std::time::Duration;

use packmule::http::reqwest_transport::ReqwestTransport;
use packmule::registry::RegistryClient;
use packmule::resolve::SizeResolver;

use crate::config::Config;

pub(crate) async fn handle_resolve(
    package: String,
    version: Option<String>,
    json: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolution is request-path only: registry access, no database.
    let transport = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?);
    let client = Arc::new(RegistryClient::new(transport, &config.registry.url));
    let resolver = SizeResolver::new(client).with_limits(config.resolve.limits());

    let resolution = resolver
        .resolve_tree(&package, version.as_deref())
        .await?;

    let Some(resolution) = resolution else {
        match &version {
            Some(version) => eprintln!("{package}@{version} not found in the registry."),
            None => eprintln!("{package} not found in the registry."),
        }
        std::process::exit(1);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution.report)?);
        return Ok(());
    }

    let root = resolution
        .packages
        .first()
        .map(|pkg| format!("{}@{}", pkg.name, pkg.version))
        .unwrap_or_else(|| package.clone());

    println!("{root}");
    println!("  self size:    {}", format_bytes(resolution.report.self_size));
    println!("  install size: {}", format_bytes(resolution.report.total_size));
    println!("  dependencies: {}", resolution.report.dependency_count);
    if resolution.report.partial {
        println!("  note: traversal truncated, sizes are a lower bound");
    }

    // Largest contributors, root excluded.
    let mut dependencies: Vec<_> = resolution.packages.iter().skip(1).collect();
    dependencies.sort_by(|a, b| b.unpacked_size.cmp(&a.unpacked_size));
    if !dependencies.is_empty() {
        println!("  largest dependencies:");
        for dependency in dependencies.iter().take(10) {
            println!(
                "    {:>10}  {}@{}",
                format_bytes(dependency.unpacked_size),
                dependency.name,
                dependency.version
            );
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
