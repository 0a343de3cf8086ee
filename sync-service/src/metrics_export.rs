//! Prometheus export of the run counters.
//!
//! A batch run exits before any scrape could reach it, so the rendered
//! counters are written to a file for the node exporter's textfile collector.

use std::{fs, path::Path};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {e}"))
}

/// Renders into a sibling temp file and renames it over `path`, so the
/// collector never reads a half-written file.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> anyhow::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, handle.render())
        .map_err(|e| anyhow::anyhow!("cannot write metrics to {}: {e}", tmp.display()))?;
    fs::rename(&tmp, path)
        .map_err(|e| anyhow::anyhow!("cannot move metrics into {}: {e}", path.display()))?;
    Ok(())
}
