use std::future::Future;

use anyhow::Result;
use futures::{select, FutureExt};
use tokio::sync::oneshot::{channel, Sender};
use tokio::task::JoinHandle;

/// Task is a spawned future that can be cancelled. The future is dropped on [Task::stop], so
/// whatever it owns is released before `stop` returns.
#[derive(Debug)]
pub struct Task<T> {
    handler: JoinHandle<Result<Option<T>>>,
    sender: Sender<()>,
}

impl<T> Task<T>
where
    T: 'static + Send,
{
    pub fn start<F>(f: F) -> Self
    where
        F: 'static + Send + Future<Output = Result<T>>,
    {
        let (tx, rx) = channel();
        Self {
            sender: tx,
            handler: tokio::spawn(async move {
                select! {
                    _ = rx.fuse() => Ok(None),
                    ret = f.fuse() => ret.map(Some),
                }
            }),
        }
    }

    /// stop cancels the task, returning `None` when it was still running and the future's output
    /// otherwise.
    pub async fn stop(self) -> Result<Option<T>> {
        let _ = self.sender.send(());
        self.handler.await?
    }
}
