use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use anyhow::{Error, Result};
use http::Uri;
use hyper::client::connect::{Connected, Connection};
use hyper::service::Service;
use hyper::Client;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use crate::handler::http::action::{Credentials, Upstream};

/// UpstreamConnector dials the configured upstream proxy whatever the destination is. The
/// connections it returns are marked as proxied, so hyper keeps absolute-form request targets.
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    upstream: Upstream,
}

impl UpstreamConnector {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    async fn connect(self, dst: Uri) -> Result<UpstreamStream> {
        let stream = TcpStream::connect((self.upstream.host.as_str(), self.upstream.port)).await?;
        trace!(
            "connected to upstream {}:{} for {}",
            self.upstream.host,
            self.upstream.port,
            dst
        );
        stream.set_nodelay(true)?;
        Ok(UpstreamStream(stream))
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamStream;
    type Error = Error;
    #[allow(clippy::type_complexity)]
    type Future =
        Pin<Box<dyn 'static + Send + Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    #[instrument]
    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

/// UpstreamStream is a connection to an upstream proxy.
#[derive(Debug)]
pub struct UpstreamStream(TcpStream);

impl Connection for UpstreamStream {
    fn connected(&self) -> Connected {
        Connected::new().proxy(true)
    }
}

impl AsyncRead for UpstreamStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// UpstreamClients keeps one pooled client per upstream proxy, shared by every connection of a
/// server.
#[derive(Debug, Clone, Default)]
pub struct UpstreamClients {
    clients: Arc<Mutex<HashMap<Upstream, Client<UpstreamConnector>>>>,
}

impl UpstreamClients {
    pub fn get(&self, upstream: &Upstream) -> Client<UpstreamConnector> {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        clients
            .entry(upstream.clone())
            .or_insert_with(|| Client::builder().build(UpstreamConnector::new(upstream.clone())))
            .clone()
    }

    pub fn len(&self) -> usize {
        match self.clients.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Credentials {
    /// proxy_authorization is the `Proxy-Authorization` value for these credentials.
    pub fn proxy_authorization(&self) -> String {
        format!(
            "Basic {}",
            base64::encode(format!("{}:{}", self.user, self.password))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_clients_are_shared() {
        let upstream = Upstream {
            host: "127.0.0.1".to_string(),
            port: 3128,
            credentials: None,
        };
        let clients = UpstreamClients::default();
        assert!(clients.is_empty());

        clients.get(&upstream);
        clients.clone().get(&upstream);
        assert_eq!(clients.len(), 1);

        clients.get(&Upstream {
            credentials: Some(Credentials {
                user: "u".to_string(),
                password: "p".to_string(),
            }),
            ..upstream
        });
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn test_proxy_authorization() {
        let credentials = Credentials {
            user: "aladdin".to_string(),
            password: "opensesame".to_string(),
        };
        assert_eq!(
            credentials.proxy_authorization(),
            "Basic YWxhZGRpbjpvcGVuc2VzYW1l"
        );
    }
}
