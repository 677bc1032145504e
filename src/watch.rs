//! Directory watcher: periodic rescan of the probe directory, driving the
//! registry's upsert/remove API and announcing membership changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config;
use crate::fleet::{FleetRegistry, UpsertOutcome};
use crate::notify::NotifierGateway;

/// Rescan loop. The initial bulk load happened silently at startup; from here
/// on every add/update/remove is announced.
pub async fn run(
    registry: Arc<FleetRegistry>,
    gateway: Arc<NotifierGateway>,
    dir: PathBuf,
    interval: Duration,
) {
    info!(dir = %dir.display(), interval_secs = interval.as_secs(), "directory watcher started");
    let mut reported = HashSet::new();

    loop {
        tokio::time::sleep(interval).await;
        rescan(&registry, &gateway, &dir, &mut reported).await;
    }
}

/// One pass over the directory: upsert every definition, remove probes whose
/// file disappeared. Each distinct problem is reported once and repeated
/// occurrences stay quiet until the directory heals.
async fn rescan(
    registry: &FleetRegistry,
    gateway: &NotifierGateway,
    dir: &Path,
    reported: &mut HashSet<String>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            let msg = format!("cannot read probe directory {}: {}", dir.display(), e);
            report_once(gateway, reported, msg).await;
            return;
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut clean = true;

    for path in paths {
        let (key, def) = match config::load_definition(&path) {
            Ok(parsed) => parsed,
            Err(e) => {
                clean = false;
                // The file still exists; an already-registered probe under
                // this key keeps running until the file parses again.
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    seen.insert(stem.to_string());
                }
                report_once(
                    gateway,
                    reported,
                    format!("failed to load probe {}: {:#}", path.display(), e),
                )
                .await;
                continue;
            }
        };
        seen.insert(key.clone());

        match registry.upsert(&key, &def).await {
            Ok(UpsertOutcome::Inserted) => {
                info!(probe = %def.name, "probe added");
                gateway
                    .announce(&format!("probe {} has been added", def.name), true)
                    .await;
            }
            Ok(UpsertOutcome::Updated) => {
                info!(probe = %def.name, "probe updated");
                gateway
                    .announce(&format!("probe {} has been updated", def.name), true)
                    .await;
            }
            Ok(UpsertOutcome::Unchanged) => {}
            Err(e) => {
                clean = false;
                report_once(gateway, reported, format!("{:#}", e)).await;
            }
        }
    }

    for key in registry.keys().await {
        if !seen.contains(&key) {
            if let Some(name) = registry.remove(&key).await {
                info!(probe = %name, "probe removed");
                gateway
                    .announce(&format!("probe {} has been removed", name), true)
                    .await;
            }
        }
    }

    if clean {
        reported.clear();
    }
}

async fn report_once(gateway: &NotifierGateway, reported: &mut HashSet<String>, msg: String) {
    if reported.insert(msg.clone()) {
        error!("{}", msg);
        gateway.announce(&msg, false).await;
    }
}
