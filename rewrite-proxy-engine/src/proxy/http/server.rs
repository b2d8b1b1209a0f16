use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{anyhow, Result};
use derivative::Derivative;
use http::header::{HOST, PROXY_AUTHORIZATION};
use http::{StatusCode, Version};
use hyper::client::HttpConnector;
use hyper::server::conn::Http;
use hyper::service::Service;
use hyper::{Body, Client, Request, Response};
use tokio::select;
use tokio::sync::oneshot::Receiver;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::engine::RuleEngine;
use crate::handler::http::action::Disposition;
use crate::handler::http::state::{RequestState, DOCUMENT_ROOT};
use crate::proxy::http::config::Config;
use crate::proxy::http::connector::UpstreamClients;
use crate::proxy::http::state::HttpState;
use crate::proxy::tcp::listener::TcpListener;

/// HttpServer accepts proxy connections and lets [HttpService] handle every request on them.
pub struct HttpServer {
    config: Arc<Config>,
    engine: Arc<RuleEngine>,
    upstreams: UpstreamClients,
}

impl HttpServer {
    pub fn new(config: Config, engine: Arc<RuleEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            upstreams: UpstreamClients::default(),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.proxy_port));
        Ok(TcpListener::bind(addr).await?)
    }

    /// serve accepts connections on the listener until `rx` fires.
    pub async fn serve(&self, listener: TcpListener, mut rx: Receiver<()>) -> Result<()> {
        info!("Proxy listening on {}", listener.local_addr()?);
        let client = Client::new();
        loop {
            let (stream, remote) = select! {
                stream = listener.accept() => stream?,
                _ = &mut rx => {
                    return Ok(());
                }
            };
            debug!(target : "Accept streaming", "remote={:?}", remote);
            let service = HttpService::new(
                remote,
                self.config.clone(),
                self.engine.clone(),
                client.clone(),
                self.upstreams.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = Http::new().serve_connection(stream, service).await {
                    debug!("connection from {} closed: {}", remote, e);
                }
            });
        }
    }
}

/// HttpService runs the rule engine on one request, then answers it the way the engine decided:
/// forwarding it, answering directly, or dropping the connection.
#[derive(Derivative)]
#[derivative(Debug)]
#[derive(Clone)]
pub struct HttpService {
    remote: SocketAddr,
    config: Arc<Config>,
    engine: Arc<RuleEngine>,

    #[derivative(Debug = "ignore")]
    client: Client<HttpConnector>,
    #[derivative(Debug = "ignore")]
    upstreams: UpstreamClients,
}

impl HttpService {
    fn new(
        remote: SocketAddr,
        config: Arc<Config>,
        engine: Arc<RuleEngine>,
        client: Client<HttpConnector>,
        upstreams: UpstreamClients,
    ) -> Self {
        Self {
            remote,
            config,
            engine,
            client,
            upstreams,
        }
    }

    #[instrument(skip(request))]
    async fn handle(self, request: Request<Body>) -> Result<Response<Body>> {
        let url = match request_url(&request) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}: {}", self.remote, e);
                return Ok(status_response(StatusCode::BAD_REQUEST, e.to_string()));
            }
        };
        trace!("{} requested {}", self.remote, url);

        let mut state = HttpState::new(url.as_str(), request.headers().clone());
        if let Some(root) = &self.config.document_root {
            state.set(DOCUMENT_ROOT, root.clone());
        }

        let result = match self.engine.evaluate(&mut state).await {
            Ok(Disposition::Abort) => {
                debug!("{} aborted", url);
                return Err(anyhow!("request to {} aborted", url));
            }
            Ok(Disposition::Forward) => self.forward(request, &state).await,
            Ok(Disposition::Send(body)) => Ok(Response::new(Body::from(body))),
            Ok(Disposition::SendFile(path)) => Ok(send_file(&path).await),
            Err(e) => Err(e),
        };
        let mut response = result.unwrap_or_else(|e| {
            error!("{} : fail to handle request: {}", url, e);
            status_response(StatusCode::BAD_GATEWAY, e.to_string())
        });

        state.apply_response(&mut response);
        if let Some(delay) = state.delay() {
            trace!("delaying {} by {:?}", url, delay);
            sleep(delay).await;
        }
        Ok(response)
    }

    /// forward dispatches the request to the URL left in the state, through the upstream proxy if
    /// one was set.
    async fn forward(&self, request: Request<Body>, state: &HttpState) -> Result<Response<Body>> {
        if let Some(command) = state.eval_directive() {
            let output = self.engine.executor().exec(command).await?;
            debug!(
                "evaluated `{}` before dispatch: {}",
                command,
                String::from_utf8_lossy(&output.body())
            );
        }

        let (mut parts, body) = request.into_parts();
        parts.uri = state.url().parse()?;
        parts.version = Version::HTTP_11;
        parts.headers = state.request_headers().clone();
        // hyper derives it again from the, possibly rewritten, URL
        parts.headers.remove(HOST);
        parts.headers.remove("proxy-connection");
        let mut request = Request::from_parts(parts, body);

        match state.upstream() {
            Some(upstream) => {
                if let Some(credentials) = &upstream.credentials {
                    request
                        .headers_mut()
                        .insert(PROXY_AUTHORIZATION, credentials.proxy_authorization().parse()?);
                }
                debug!(
                    "forwarding {} via {}:{}",
                    request.uri(),
                    upstream.host,
                    upstream.port
                );
                Ok(self.upstreams.get(upstream).request(request).await?)
            }
            None => {
                debug!("forwarding {}", request.uri());
                Ok(self.client.request(request).await?)
            }
        }
    }
}

/// request_url rebuilds the full URL of a request. Proxy requests carry it in absolute form;
/// origin-form requests are completed from the `Host` header.
fn request_url(request: &Request<Body>) -> Result<String> {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.to_string());
    }
    let host = request
        .headers()
        .get(HOST)
        .ok_or_else(|| anyhow!("request to {} has no host", uri))?
        .to_str()?;
    let path = uri.path_and_query().map_or("/", |paq| paq.as_str());
    Ok(format!("http://{}{}", host, path))
}

async fn send_file(path: &Path) -> Response<Body> {
    match tokio::fs::read(path).await {
        Ok(contents) => Response::new(Body::from(contents)),
        Err(e) => {
            warn!("cannot serve {:?}: {}", path, e);
            status_response(StatusCode::NOT_FOUND, String::new())
        }
    }
}

fn status_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

impl Service<Request<Body>> for HttpService {
    type Response = Response<Body>;
    type Error = anyhow::Error;
    #[allow(clippy::type_complexity)]
    type Future =
        Pin<Box<dyn 'static + Send + Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    #[inline]
    fn call(&mut self, request: Request<Body>) -> Self::Future {
        Box::pin(self.clone().handle(request))
    }
}
