use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use rewrite_proxy_engine::engine::RuleEngine;
use tracing::{debug, error};

/// ConfigWatcher polls the modification time of the rules file and reloads the engine when it
/// changes.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    engine: Arc<RuleEngine>,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// new records the current modification time, so a file loaded just before is not reloaded
    /// on the first poll.
    pub async fn new(path: PathBuf, interval: Duration, engine: Arc<RuleEngine>) -> Self {
        let mut watcher = Self {
            path,
            interval,
            engine,
            last_modified: None,
        };
        watcher.last_modified = watcher.modified().await;
        watcher
    }

    async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path).await.ok()?.modified().ok()
    }

    /// check reloads the rules file if its modification time moved since the last check.
    /// Returns whether a reload happened; a failed reload keeps the current rules.
    pub async fn check(&mut self) -> Result<bool> {
        let modified = self.modified().await;
        if modified == self.last_modified {
            return Ok(false);
        }
        self.last_modified = modified;
        debug!("{:?} changed", self.path);
        self.engine.reload(&self.path).await?;
        Ok(true)
    }

    pub async fn watch(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.check().await {
                error!("config parse error: {}", err);
            }
        }
    }
}
