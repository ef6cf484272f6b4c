use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use deskd::directory::{Directory, Manifest};
use deskd::orgs::OrgManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("DESKD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    deskd::observability::init(metrics_port);

    let data_dir = std::env::var("DESKD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let manifest_path =
        std::env::var("DESKD_DIRECTORY").unwrap_or_else(|_| "./directory.json".into());
    let sweep_secs: u64 = std::env::var("DESKD_SWEEP_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);
    let compact_threshold: u64 = std::env::var("DESKD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let manifest: Manifest = serde_json::from_slice(&std::fs::read(&manifest_path)?)?;

    let orgs = Arc::new(OrgManager::new(
        PathBuf::from(&data_dir),
        compact_threshold,
        Duration::from_secs(sweep_secs),
    ));

    let mut org_count = 0usize;
    for org in manifest.organizations {
        let directory = Arc::new(Directory::from_seed(org.directory));
        orgs.get_or_create(&org.name, directory)?;
        org_count += 1;
    }

    // One pass at boot so rows that expired while we were down don't
    // linger until the first timer tick.
    let released = orgs.release_expired_all().await;

    info!("deskd serving {org_count} organizations");
    info!("  data_dir: {data_dir}");
    info!("  directory: {manifest_path}");
    info!("  sweep period: {sweep_secs}s");
    info!("  released at boot: {released}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: wait for SIGTERM/ctrl-c
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("shutdown signal received");
    info!("deskd stopped");
    Ok(())
}
