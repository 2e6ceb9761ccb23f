mod middleware;

use crate::http::Upstream;
use crate::prelude::*;
use crate::{proxy, random_post, Result};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

pub(crate) const PROXY_ROUTE: &str = "/api/filmgrab-proxy";
pub(crate) const RANDOM_POST_ROUTE: &str = "/api/filmgrab-random";

#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_listen_addr")]
    pub(crate) listen_addr: SocketAddr,

    /// Public origin of the service used to build links back to it.
    /// If not set, the origin is inferred from the request headers.
    pub(crate) base_url: Option<Url>,
}

fn default_listen_addr() -> SocketAddr {
    ([0, 0, 0, 0], 3000).into()
}

#[derive(Clone)]
pub(crate) struct AppState {
    imp: Arc<AppStateImp>,
}

struct AppStateImp {
    config: crate::Config,
    upstream: Box<dyn Upstream>,

    /// Source of randomness for picking the images. It's shared between
    /// the requests and locked only for the duration of a single pick.
    rng: Mutex<StdRng>,
}

impl AppState {
    pub(crate) fn new(config: crate::Config, upstream: impl Upstream) -> Self {
        Self::with_rng(config, upstream, StdRng::from_entropy())
    }

    pub(crate) fn with_rng(config: crate::Config, upstream: impl Upstream, rng: StdRng) -> Self {
        let imp = AppStateImp {
            config,
            upstream: Box::new(upstream),
            rng: Mutex::new(rng),
        };
        Self { imp: Arc::new(imp) }
    }

    pub(crate) fn config(&self) -> &crate::Config {
        &self.imp.config
    }

    pub(crate) fn upstream(&self) -> &dyn Upstream {
        &*self.imp.upstream
    }

    pub(crate) fn with_rng_mut<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.imp.rng.lock())
    }

    /// Origin under which the caller reaches this service.
    pub(crate) fn base_url(&self, headers: &HeaderMap) -> Result<Url> {
        if let Some(base_url) = &self.config().server.base_url {
            return Ok(base_url.clone());
        }

        let proto = headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|proto| !proto.is_empty())
            .unwrap_or("https");

        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .fatal_ctx(|| "The request has no valid Host header")?;

        Url::parse(&format!("{proto}://{host}"))
            .fatal_ctx(|| format!("Can't build the base URL from {proto:?} and {host:?}"))
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route(PROXY_ROUTE, get(proxy::handle))
        .route(RANDOM_POST_ROUTE, get(random_post::handle))
        .layer(axum::middleware::from_fn(middleware::cors))
        .layer(axum::middleware::from_fn(middleware::observe))
        .with_state(state)
}

pub(crate) async fn serve(config: Config, state: AppState) -> Result {
    let addr = config.listen_addr;

    let server = axum::Server::try_bind(&addr)
        .fatal_ctx(|| format!("Failed to bind the HTTP server to {addr}"))?
        .serve(router(state).into_make_service());

    info!(%addr, "Listening for HTTP requests");

    server
        .with_graceful_shutdown(shutdown_signal())
        .await
        .fatal_ctx(|| "HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            err = tracing_err(&err),
            "Failed to wait for Ctrl+C, exiting..."
        );
    } else {
        info!("Ctrl+C received, shutting down the server...");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use tower::ServiceExt;

    pub(crate) const TEST_SEED: u64 = 42;

    pub(crate) fn test_config() -> crate::Config {
        crate::Config {
            server: Config {
                listen_addr: default_listen_addr(),
                base_url: None,
            },
            upstream: Default::default(),
        }
    }

    pub(crate) fn test_state(upstream: impl Upstream) -> AppState {
        AppState::with_rng(test_config(), upstream, StdRng::seed_from_u64(TEST_SEED))
    }

    pub(crate) async fn send(state: AppState, request: Request<Body>) -> Response {
        router(state).oneshot(request).await.unwrap()
    }

    pub(crate) async fn get(state: AppState, uri: &str) -> Response {
        let request = Request::get(uri)
            .header(HOST, "grabber.test")
            .body(Body::empty())
            .unwrap();

        send(state, request).await
    }

    pub(crate) async fn read_body(response: Response) -> bytes::Bytes {
        hyper::body::to_bytes(response.into_body()).await.unwrap()
    }
}
