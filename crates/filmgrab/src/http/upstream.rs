use super::{Client, Config, HttpClientError};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::prelude::*;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use std::fmt;
use url::Url;

/// The only way the handlers reach the third-party servers.
#[async_trait]
pub(crate) trait Upstream: Send + Sync + 'static {
    /// Sends a `GET` request following the redirects. Non-success status codes
    /// are not errors at this level, the caller decides what to do with them.
    /// The body is not read until the caller asks for it.
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<UpstreamResponse>;
}

#[derive(Debug)]
pub(crate) struct UpstreamResponse {
    /// Final URL of the resource after all the redirects
    pub(crate) url: Url,
    pub(crate) status: StatusCode,
    pub(crate) content_type: Option<String>,
    pub(crate) body: UpstreamBody,
}

/// Body of the response that is still in flight. Dropping it without reading
/// discards the rest of the payload.
pub(crate) struct UpstreamBody(BoxFuture<'static, Result<Bytes>>);

impl UpstreamBody {
    pub(crate) fn new(read: impl Future<Output = Result<Bytes>> + Send + 'static) -> Self {
        Self(read.boxed())
    }

    pub(crate) async fn bytes(self) -> Result<Bytes> {
        self.0.await
    }
}

impl fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpstreamBody { .. }")
    }
}

pub(crate) struct ReqwestUpstream {
    http: Client,
}

impl ReqwestUpstream {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: super::create_client(config)?,
        })
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<UpstreamResponse> {
        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(err_ctx!(HttpClientError::Request))?;

        let url = response.url().clone();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);

        let body = UpstreamBody::new(async move {
            response
                .bytes()
                .await
                .map_err(err_ctx!(HttpClientError::ReadPayload))
        });

        Ok(UpstreamResponse {
            url,
            status,
            content_type,
            body,
        })
    }
}
