//! Probe mode — one tip fetch against the configured node.

use anyhow::{Context, bail};
use tokio::time::Instant;
use tracing::info;

use tipwatch_client::{NodeApi, NodeClient};
use tipwatch_core::MonitorConfig;

/// Fetch the tip once. Prints it as JSON unless `quiet`; errors when the
/// node is unreachable so the process exits non-zero.
pub async fn run_probe(config: &MonitorConfig, quiet: bool) -> anyhow::Result<()> {
    let client = NodeClient::new(&config.node_url)?.with_timeout(config.request_timeout);

    if quiet {
        if !client.is_healthy().await {
            bail!("node at {} is unreachable", config.node_url);
        }
        return Ok(());
    }

    let tip = client
        .fetch_tip(Instant::now() + config.request_timeout)
        .await
        .with_context(|| format!("tip fetch from {} failed", config.node_url))?;

    info!(block = tip.block_no, epoch = tip.epoch, "node reachable");
    println!("{}", serde_json::to_string_pretty(&tip)?);
    Ok(())
}
