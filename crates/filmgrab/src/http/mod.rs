mod upstream;

use crate::observability::metrics::UPSTREAM_REQUEST_DURATION_SECONDS;
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub(crate) use upstream::*;

pub(crate) type Client = reqwest_middleware::ClientWithMiddleware;

const MAX_REDIRECTS: usize = 20;

#[derive(Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Page that redirects to a random post of the gallery
    pub(crate) random_post_url: String,

    /// Host of the image CDN that is used as a fallback to deliver images
    pub(crate) cdn_host: String,

    /// `Referer` sent to the upstream if the caller didn't specify one
    pub(crate) default_referer: String,

    /// `Origin` sent to the upstream along with the `Referer`
    pub(crate) origin: String,

    /// Upper bound on the duration of a single upstream request
    pub(crate) timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            random_post_url: "https://film-grab.com/random-post/".to_owned(),
            cdn_host: "i0.wp.com".to_owned(),
            default_referer: "https://film-grab.com/".to_owned(),
            origin: "https://film-grab.com".to_owned(),
            timeout_secs: 20,
        }
    }
}

pub(crate) fn create_client(config: &Config) -> Result<Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
        .fatal_ctx(|| "Failed to build the HTTP client")?;

    Ok(reqwest_middleware::ClientBuilder::new(client)
        .with(ObservingMiddleware)
        .build())
}

struct ObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for ObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut task_local_extensions::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let span = info_span!(
            "request",
            version = ?request.version(),
            method = %request.method(),
            url = %request.url(),
        );

        observe_request(request, extensions, next)
            .instrument(span)
            .await
    }
}

async fn observe_request(
    request: reqwest::Request,
    extensions: &mut task_local_extensions::Extensions,
    next: reqwest_middleware::Next<'_>,
) -> reqwest_middleware::Result<reqwest::Response> {
    let host = request.url().host_str().unwrap_or("{unknown}").to_owned();

    let (result, duration) = next.run(request, extensions).with_duration().await;

    let status = match &result {
        Ok(response) => response.status().to_string(),
        Err(_) => "{fatal}".to_owned(),
    };

    metrics::histogram!(
        UPSTREAM_REQUEST_DURATION_SECONDS,
        duration.as_secs_f64(),
        "host" => host,
        "status" => status
    );

    let duration = tracing_duration(duration);

    let response = match &result {
        Ok(response) => response,
        Err(err) => {
            warn!(duration, err = tracing_err(err), "Network request failed");
            return result;
        }
    };

    let status = response.status();

    let Err(err) = response.error_for_status_ref() else {
        info!(duration, %status, "Network request succeeded");
        return result;
    };

    warn!(
        err = tracing_err(&err),
        duration,
        %status,
        "Network request failed (error status)"
    );

    result
}

/// Errors at the layer of the HTTP API
#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest_middleware::Error },

    #[error("Failed to read HTTP response")]
    ReadPayload { source: reqwest::Error },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};

    /// Serves every connection on a background thread with the raw HTTP
    /// response returned by `respond` for the requested path.
    fn serve_raw(respond: fn(&str) -> String) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                let path = read_request_path(&mut stream);
                stream.write_all(respond(&path).as_bytes()).unwrap();
            }
        });

        addr
    }

    fn read_request_path(stream: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0; 1024];

        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        String::from_utf8_lossy(&request)
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_owned()
    }

    #[test_log::test(tokio::test)]
    async fn follows_long_redirect_chains() {
        let addr = serve_raw(|path| {
            let hops: u32 = path.trim_start_matches("/hop/").parse().unwrap();
            if hops == 0 {
                return "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndone"
                    .to_owned();
            }
            format!(
                "HTTP/1.1 302 Found\r\nLocation: /hop/{}\r\n\
                 Content-Length: 0\r\nConnection: close\r\n\r\n",
                hops - 1
            )
        });

        let upstream = ReqwestUpstream::new(&Config::default()).unwrap();
        let response = upstream
            .get(&format!("http://{addr}/hop/15"), Default::default())
            .await
            .unwrap();

        assert_eq!(response.status, reqwest::StatusCode::OK);
        assert_eq!(response.url.path(), "/hop/0");
        assert_eq!(&response.body.bytes().await.unwrap()[..], b"done");
    }

    #[test_log::test(tokio::test)]
    async fn truncated_body_fails_only_when_read() {
        let addr = serve_raw(|_| {
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\
             Content-Length: 1000\r\nConnection: close\r\n\r\npartial"
                .to_owned()
        });

        let upstream = ReqwestUpstream::new(&Config::default()).unwrap();
        let response = upstream
            .get(&format!("http://{addr}/still.png"), Default::default())
            .await
            .unwrap();

        assert_eq!(response.status, reqwest::StatusCode::OK);
        assert_eq!(response.content_type.as_deref(), Some("image/png"));

        let err = response.body.bytes().await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test_log::test(tokio::test)]
    #[ignore]
    async fn manual_sandbox() {
        let upstream = ReqwestUpstream::new(&Config::default()).unwrap();
        let response = upstream
            .get(&Config::default().random_post_url, Default::default())
            .await
            .unwrap();

        dbg!(response.url, response.status, response.content_type);
    }
}
