//! Picks a random still from a random post of the gallery.

mod scrape;

use crate::http::Upstream;
use crate::prelude::*;
use crate::server::{AppState, PROXY_ROUTE};
use crate::util::url::upgrade_to_https;
use crate::Result;
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderValue, CACHE_CONTROL};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use url::Url;

pub(crate) use scrape::*;

const ATTRIBUTION: &str = "Source: FilmGrab";
const CACHE_CONTROL_VALUE: &str = "public, max-age=60";

const PAGE_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/118 Safari/537.36",
);

#[derive(Debug, thiserror::Error)]
pub(crate) enum RandomPostError {
    #[error("No stills found on the page.")]
    NoStillsFound,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RandomStill {
    ok: bool,
    film: Option<String>,
    credits: Option<String>,
    post_url: Url,

    /// The original URL that may be blocked if requested from the browser
    image_url: String,

    /// Same-origin URL of the image that should be used in `<img src="...">`
    proxied_image: Url,
    attribution: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    ok: bool,
    error: String,
}

/// Fetched page of a random post
struct PostPage {
    /// URL of the post after the redirect from the random post page
    url: Url,
    html: String,
}

async fn fetch_random_post(upstream: &dyn Upstream, random_post_url: &str) -> Result<PostPage> {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(PAGE_USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

    let response = upstream.get(random_post_url, headers).await?;

    let body = response.body.bytes().await?;
    let html = String::from_utf8_lossy(&body).into_owned();

    Ok(PostPage {
        url: response.url,
        html,
    })
}

/// Picks one of the images uniformly at random and upgrades it to `https`
pub(crate) fn pick_image(images: &[String], rng: &mut impl Rng) -> Option<String> {
    images
        .choose(rng)
        .map(|image| upgrade_to_https(image))
}

/// URL of the image proxy endpoint of this service that streams the given image
pub(crate) fn proxy_url(base: &Url, image_url: &str, post_url: &Url) -> Result<Url> {
    let mut url = base.clone();

    url.path_segments_mut()
        .map_err(|()| fatal!("Base URL can't have a path: {base}"))?
        .pop_if_empty()
        .extend(PROXY_ROUTE.trim_start_matches('/').split('/'));

    url.set_query(None);
    url.set_fragment(None);

    url.query_pairs_mut()
        .append_pair("src", image_url)
        .append_pair("ref", post_url.as_str());

    Ok(url)
}

pub(crate) async fn random_still(state: &AppState, base: &Url) -> Result<RandomStill> {
    let page = fetch_random_post(state.upstream(), &state.config().upstream.random_post_url)
        .with_duration_log("Fetching a random post page")
        .await?;

    let post = scrape_post(&page.html);

    info!(
        post_url = %page.url,
        title = post.title.as_deref(),
        images = post.images.len(),
        "Scraped the post"
    );

    let Some(image_url) = state.with_rng_mut(|rng| pick_image(&post.images, rng)) else {
        warn!(post_url = %page.url, "The post has no stills");
        return Err(err!(RandomPostError::NoStillsFound));
    };

    let proxied_image = proxy_url(base, &image_url, &page.url)?;

    Ok(RandomStill {
        ok: true,
        film: post.title,
        credits: post.credits,
        post_url: page.url,
        image_url,
        proxied_image,
        attribution: ATTRIBUTION,
    })
}

pub(crate) async fn handle(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = match state.base_url(&headers) {
        Ok(base) => random_still(&state, &base).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(still) => (
            [(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE))],
            Json(still),
        )
            .into_response(),
        Err(err) => {
            err.log("Random post request failed");
            let payload = ErrorPayload {
                ok: false,
                error: err.public_message(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
