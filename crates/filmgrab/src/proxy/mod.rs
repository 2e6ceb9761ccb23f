//! Streams an image from an upstream to the caller trying several fallbacks
//! to get around the hotlink protection.

mod plan;

use crate::http::{self, Upstream, UpstreamResponse};
use crate::observability::metrics::PROXY_ATTEMPTS_TOTAL;
use crate::prelude::*;
use crate::server::AppState;
use crate::Result;
use axum::extract::{RawQuery, State};
use axum::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

pub(crate) use plan::*;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const CACHE_CONTROL_VALUE: &str = "public, max-age=300, s-maxage=600";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProxyError {
    #[error("Missing ?src=IMAGE_URL")]
    MissingSrc,

    #[error("Upstream fetch failed.")]
    UpstreamExhausted,
}

impl ProxyError {
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingSrc => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamExhausted => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ProxyQuery {
    /// URL of the image to proxy
    pub(crate) src: Option<String>,

    /// Overrides the default `Referer` sent to the upstream
    pub(crate) referer: Option<String>,
}

impl ProxyQuery {
    /// Parses the raw query string. Only the first occurrence of each parameter
    /// is used, and empty values are treated as absent.
    pub(crate) fn parse(query: &str) -> Self {
        let mut src = None;
        let mut referer = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "src" => &mut src,
                "ref" => &mut referer,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }

        Self {
            src: src.filter(|src: &String| !src.is_empty()),
            referer: referer.filter(|referer: &String| !referer.is_empty()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ProxiedImage {
    pub(crate) content_type: String,
    pub(crate) body: Bytes,
}

/// Tries the fetch attempts one by one and returns the first successful one.
/// No requests are sent after the first success, even if reading its body fails.
pub(crate) async fn fetch_image(
    upstream: &dyn Upstream,
    config: &http::Config,
    query: ProxyQuery,
) -> Result<ProxiedImage> {
    let Some(src) = query.src else {
        return Err(err!(ProxyError::MissingSrc));
    };

    let referer = query.referer.as_deref().unwrap_or(&config.default_referer);

    let attempts = plan_attempts(&config.cdn_host, &src);
    let total = attempts.len();

    for (i, attempt) in attempts.into_iter().enumerate() {
        let span = info_span!(
            "proxy_attempt",
            attempt = i + 1,
            total,
            target = attempt.target.as_str(),
            profile = attempt.profile.as_str(),
            url = %attempt.url,
        );

        let outcome = try_attempt(upstream, config, referer, &attempt)
            .instrument(span.clone())
            .await;

        let label = match &outcome {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::BadStatus => "bad_status",
            AttemptOutcome::Failed => "failed",
        };

        metrics::counter!(
            PROXY_ATTEMPTS_TOTAL,
            1,
            "target" => attempt.target.as_str(),
            "profile" => attempt.profile.as_str(),
            "outcome" => label
        );

        // The attempt that answered with a success status is final. Failing to
        // read its body doesn't let the next attempts run.
        if let AttemptOutcome::Success(response) = outcome {
            let body = response.body.bytes().instrument(span).await?;

            let content_type = response
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());

            return Ok(ProxiedImage { content_type, body });
        }
    }

    Err(err!(ProxyError::UpstreamExhausted))
}

enum AttemptOutcome {
    Success(UpstreamResponse),
    BadStatus,
    Failed,
}

async fn try_attempt(
    upstream: &dyn Upstream,
    config: &http::Config,
    referer: &str,
    attempt: &FetchAttempt,
) -> AttemptOutcome {
    let response = match attempt.profile.headers(referer, &config.origin) {
        Ok(headers) => upstream.get(&attempt.url, headers).await,
        Err(err) => Err(err),
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            debug!(err = tracing_err(&err), "Fetch attempt failed");
            return AttemptOutcome::Failed;
        }
    };

    if !response.status.is_success() {
        debug!(status = %response.status, "Fetch attempt returned a non-success status");
        return AttemptOutcome::BadStatus;
    }

    AttemptOutcome::Success(response)
}

impl ProxiedImage {
    fn into_http_response(self) -> Result<Response> {
        let content_type = HeaderValue::try_from(self.content_type)
            .fatal_ctx(|| "Upstream returned a malformed content type")?;

        Ok((
            [
                (CONTENT_TYPE, content_type),
                (CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE)),
            ],
            self.body,
        )
            .into_response())
    }
}

pub(crate) async fn handle(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let query = ProxyQuery::parse(query.as_deref().unwrap_or_default());

    let result = fetch_image(state.upstream(), &state.config().upstream, query)
        .await
        .and_then(ProxiedImage::into_http_response);

    result.unwrap_or_else(|err| {
        err.log("Image proxy request failed");
        (err.status_code(), err.public_message()).into_response()
    })
}
