use std::io;

use futures::future::select_all;
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Signals listens on a set of unix signals at once.
#[derive(Debug)]
pub struct Signals(Vec<(SignalKind, Signal)>);

impl Signals {
    pub fn from_kinds(kinds: &[SignalKind]) -> io::Result<Self> {
        kinds
            .iter()
            .map(|kind| Ok((*kind, signal(*kind)?)))
            .collect::<io::Result<Vec<_>>>()
            .map(Self)
    }

    /// wait resolves with the kind of the next signal received.
    pub async fn wait(&mut self) -> SignalKind {
        let waits = self.0.iter_mut().map(|(kind, signal)| {
            Box::pin(async move {
                signal.recv().await;
                *kind
            })
        });
        select_all(waits).await.0
    }
}
