use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rewrite_proxy_engine::engine::RuleEngine;
use rewrite_proxy_engine::proxy::http::server::HttpServer;
use rewrite_proxy_engine::task::Task;
use tokio::sync::oneshot::{channel, Sender};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::proxy::config::Config;
use crate::proxy::watcher::ConfigWatcher;

/// Proxy supervises the HTTP server and the rules file watcher.
#[derive(Debug)]
pub struct Proxy {
    engine: Arc<RuleEngine>,
    rules_file: Option<PathBuf>,
    sender: Option<Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
    watcher: Option<Task<()>>,
}

impl Proxy {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self {
            engine,
            rules_file: None,
            sender: None,
            task: None,
            watcher: None,
        }
    }

    pub fn engine(&self) -> Arc<RuleEngine> {
        self.engine.clone()
    }

    /// start loads the rules file and serves on the configured port, returning the bound
    /// address. A rules file that cannot be read leaves the proxy forwarding everything.
    pub async fn start(&mut self, config: Config) -> Result<SocketAddr> {
        self.stop().await?;
        self.rules_file = Some(config.rules_file.clone());
        self.reload().await;

        let server = HttpServer::new(config.proxy_config, self.engine.clone());
        let listener = server.bind().await?;
        let addr = listener.local_addr()?;
        let (sender, rx) = channel();
        self.sender = Some(sender);
        self.task = Some(tokio::spawn(
            async move { server.serve(listener, rx).await },
        ));

        let watcher =
            ConfigWatcher::new(config.rules_file, config.watch_interval, self.engine.clone())
                .await;
        self.watcher = Some(Task::start(watcher.watch()));
        Ok(addr)
    }

    /// reload rereads the rules file; on failure the current rules stay published.
    pub async fn reload(&self) {
        if let Some(path) = &self.rules_file {
            if let Err(err) = self.engine.reload(path).await {
                error!("config parse error: {}", err);
            }
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await?;
        }
        if let Some(task) = self.task.take() {
            if let Some(sender) = self.sender.take() {
                let _ = sender.send(());
            }
            task.await??;
            info!("proxy stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rewrite_proxy_engine::handler::http::rule::Ruleset;
    use rewrite_proxy_engine::proxy::http::config::Config as HttpConfig;

    use super::*;

    #[tokio::test]
    async fn test_start_stop() {
        let dir = tempfile::tempdir().unwrap();
        let rules_file = dir.path().join("config.txt");
        tokio::fs::write(&rules_file, "[off]\nexample.com =>\n")
            .await
            .unwrap();

        let mut proxy = Proxy::new(Arc::new(RuleEngine::new(Ruleset::default())));
        let addr = proxy
            .start(Config {
                rules_file,
                watch_interval: Duration::from_millis(20),
                proxy_config: HttpConfig {
                    proxy_port: 0,
                    document_root: None,
                },
            })
            .await
            .unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(proxy.engine().snapshot().sections.len(), 1);
        proxy.stop().await.unwrap();
        proxy.stop().await.unwrap();
    }
}
