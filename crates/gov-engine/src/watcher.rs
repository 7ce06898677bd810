// watcher.rs — Hot reload of governance.toml and constitution.yaml.
//
// A filesystem watcher on the `.gov/` directory forwards create/modify
// events to a task that re-reads the changed file and installs it on the
// engine. A file that fails to parse or validate is logged and ignored; the
// engine keeps running on the configuration it already has.

use std::path::{Path, PathBuf};

use gov_policy::RuleSet;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, GovPaths};
use crate::engine::GovernanceEngine;
use crate::error::EngineError;

pub struct ConfigWatcher {
    // Dropping the watcher closes the event channel.
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchedFile {
    Config,
    Constitution,
}

impl ConfigWatcher {
    pub fn start(
        engine: GovernanceEngine,
        paths: &GovPaths,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&paths.gov_dir).map_err(|e| {
            EngineError::Config(format!(
                "cannot create {}: {}",
                paths.gov_dir.display(),
                e
            ))
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "config watcher error"),
            }
        })
        .map_err(|e| EngineError::Config(format!("cannot start config watcher: {}", e)))?;
        watcher
            .watch(&paths.gov_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                EngineError::Config(format!(
                    "cannot watch {}: {}",
                    paths.gov_dir.display(),
                    e
                ))
            })?;

        let dir = paths.gov_dir.display().to_string();
        let paths = paths.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    _ = token.cancelled() => break,
                    changed = rx.recv() => changed,
                };
                let Some(path) = changed else { break };
                match classify(&path, &paths) {
                    Some(WatchedFile::Config) => reload_config(&engine, &paths.config),
                    Some(WatchedFile::Constitution) => {
                        reload_constitution(&engine, &paths.constitution)
                    }
                    None => {}
                }
            }
            tracing::debug!("config watcher stopped");
        });

        tracing::info!(%dir, "watching governance configuration");
        Ok(Self {
            _watcher: watcher,
            task,
            cancel,
        })
    }

    /// Stop watching and wait for the reload task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "config watcher task failed");
        }
    }
}

fn classify(path: &Path, paths: &GovPaths) -> Option<WatchedFile> {
    let name = path.file_name()?;
    if Some(name) == paths.config.file_name() {
        Some(WatchedFile::Config)
    } else if Some(name) == paths.constitution.file_name() {
        Some(WatchedFile::Constitution)
    } else {
        None
    }
}

fn reload_config(engine: &GovernanceEngine, path: &Path) {
    let result = EngineConfig::load(path).and_then(|config| engine.reload_config(config));
    if let Err(e) = result {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "rejected configuration change, keeping the running configuration"
        );
    }
}

fn reload_constitution(engine: &GovernanceEngine, path: &Path) {
    match RuleSet::load(path) {
        Ok(rules) => engine.reload_rules(rules),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "rejected constitution change, keeping the running rules"
        ),
    }
}
