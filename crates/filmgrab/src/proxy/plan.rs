//! Ordered list of the strategies used to fetch an image from an upstream
//! that may be protected from hotlinking.

use crate::prelude::*;
use crate::Result;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

pub(crate) const BROWSER_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
);

const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Headers that make the request look like the browser loads an `<img>`
/// embedded on the upstream's own site.
const SAME_SITE_IMAGE_HEADERS: &[(&str, &str)] = &[
    ("sec-fetch-site", "same-site"),
    ("sec-fetch-mode", "no-cors"),
    ("sec-fetch-dest", "image"),
];

/// The URL that the attempt fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// The image URL exactly as the caller specified it
    Direct,

    /// CDN rewrite that preserves the original query
    CdnWithQuery,

    /// CDN rewrite without the original query
    CdnWithoutQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderProfile {
    WithReferer,

    /// Sends an empty `Referer` to defeat referrer-based hotlink protection
    NoReferer,
}

/// The order in which the fetch strategies are tried.
const ATTEMPT_PLAN: &[(Target, HeaderProfile)] = &[
    (Target::Direct, HeaderProfile::WithReferer),
    (Target::Direct, HeaderProfile::NoReferer),
    (Target::CdnWithQuery, HeaderProfile::WithReferer),
    (Target::CdnWithoutQuery, HeaderProfile::WithReferer),
    (Target::CdnWithQuery, HeaderProfile::NoReferer),
    (Target::CdnWithoutQuery, HeaderProfile::NoReferer),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchAttempt {
    pub(crate) target: Target,
    pub(crate) profile: HeaderProfile,
    pub(crate) url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CdnVariants {
    pub(crate) with_query: String,
    pub(crate) without_query: String,
}

/// Rewrites the URL to be served via the image CDN.
/// Returns [`None`] if `url` isn't an absolute URL.
pub(crate) fn cdn_variants(cdn_host: &str, url: &str) -> Option<CdnVariants> {
    let url = url::Url::parse(url).ok()?;

    let base = format!("https://{cdn_host}/{}{}", url.host_with_port(), url.path());

    let with_query = match url.query().filter(|query| !query.is_empty()) {
        Some(query) => format!("{base}?{query}&ssl=1"),
        None => format!("{base}?ssl=1"),
    };

    Some(CdnVariants {
        with_query,
        without_query: format!("{base}?ssl=1"),
    })
}

/// Builds the list of attempts to fetch `src` in the order they must be tried.
/// CDN attempts are left out if `src` can't be rewritten.
pub(crate) fn plan_attempts(cdn_host: &str, src: &str) -> Vec<FetchAttempt> {
    let cdn = cdn_variants(cdn_host, src);

    ATTEMPT_PLAN
        .iter()
        .filter_map(|&(target, profile)| {
            let url = match target {
                Target::Direct => src.to_owned(),
                Target::CdnWithQuery => cdn.as_ref()?.with_query.clone(),
                Target::CdnWithoutQuery => cdn.as_ref()?.without_query.clone(),
            };
            Some(FetchAttempt {
                target,
                profile,
                url,
            })
        })
        .collect()
}

impl Target {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Target::Direct => "direct",
            Target::CdnWithQuery => "cdn_with_query",
            Target::CdnWithoutQuery => "cdn_without_query",
        }
    }
}

impl HeaderProfile {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            HeaderProfile::WithReferer => "with_referer",
            HeaderProfile::NoReferer => "no_referer",
        }
    }

    /// Request headers for this profile. The `referer` and `origin` are
    /// used only by [`HeaderProfile::WithReferer`].
    pub(crate) fn headers(self, referer: &str, origin: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(BROWSER_USER_AGENT),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_IMAGE));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );

        match self {
            HeaderProfile::NoReferer => {
                headers.insert(header::REFERER, HeaderValue::from_static(""));
            }
            HeaderProfile::WithReferer => {
                let referer = HeaderValue::from_str(referer)
                    .fatal_ctx(|| format!("Invalid referer header value: {referer:?}"))?;
                let origin = HeaderValue::from_str(origin)
                    .fatal_ctx(|| format!("Invalid origin header value: {origin:?}"))?;

                headers.insert(header::REFERER, referer);
                headers.insert(header::ORIGIN, origin);

                for &(name, value) in SAME_SITE_IMAGE_HEADERS {
                    headers.insert(
                        HeaderName::from_static(name),
                        HeaderValue::from_static(value),
                    );
                }
            }
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    const CDN: &str = "i0.wp.com";

    #[test]
    fn cdn_rewrite() {
        let test = |url: &str, expected: expect_test::Expect| {
            test_bat::debug::assert_eq(cdn_variants(CDN, url), &expected);
        };

        test(
            "https://film-grab.com/wp-content/uploads/2020/01/still.jpg?resize=1024%2C576",
            expect![[r#"
                Some(
                    CdnVariants {
                        with_query: "https://i0.wp.com/film-grab.com/wp-content/uploads/2020/01/still.jpg?resize=1024%2C576&ssl=1",
                        without_query: "https://i0.wp.com/film-grab.com/wp-content/uploads/2020/01/still.jpg?ssl=1",
                    },
                )"#]],
        );
        test(
            "http://film-grab.com/still.png",
            expect![[r#"
                Some(
                    CdnVariants {
                        with_query: "https://i0.wp.com/film-grab.com/still.png?ssl=1",
                        without_query: "https://i0.wp.com/film-grab.com/still.png?ssl=1",
                    },
                )"#]],
        );
        test(
            "http://localhost:8080/still.png?a=b",
            expect![[r#"
                Some(
                    CdnVariants {
                        with_query: "https://i0.wp.com/localhost:8080/still.png?a=b&ssl=1",
                        without_query: "https://i0.wp.com/localhost:8080/still.png?ssl=1",
                    },
                )"#]],
        );
        test("/wp-content/uploads/still.jpg", expect!["None"]);
        test("not a url at all", expect!["None"]);
    }

    #[test]
    fn attempts_order() {
        let attempts = plan_attempts(CDN, "https://film-grab.com/a.jpg?w=1");
        let actual = attempts.map_collect::<Vec<_>, _>(|attempt| {
            format!(
                "{}/{}: {}",
                attempt.target.as_str(),
                attempt.profile.as_str(),
                attempt.url
            )
        });

        expect![[r#"
            [
                "direct/with_referer: https://film-grab.com/a.jpg?w=1",
                "direct/no_referer: https://film-grab.com/a.jpg?w=1",
                "cdn_with_query/with_referer: https://i0.wp.com/film-grab.com/a.jpg?w=1&ssl=1",
                "cdn_without_query/with_referer: https://i0.wp.com/film-grab.com/a.jpg?ssl=1",
                "cdn_with_query/no_referer: https://i0.wp.com/film-grab.com/a.jpg?w=1&ssl=1",
                "cdn_without_query/no_referer: https://i0.wp.com/film-grab.com/a.jpg?ssl=1",
            ]
        "#]]
        .assert_debug_eq(&actual);
    }

    #[test]
    fn attempts_without_cdn_for_relative_url() {
        let attempts = plan_attempts(CDN, "still.jpg");
        assert_eq!(
            attempts,
            [
                FetchAttempt {
                    target: Target::Direct,
                    profile: HeaderProfile::WithReferer,
                    url: "still.jpg".to_owned(),
                },
                FetchAttempt {
                    target: Target::Direct,
                    profile: HeaderProfile::NoReferer,
                    url: "still.jpg".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn header_profiles() {
        let with_referer = HeaderProfile::WithReferer
            .headers("https://film-grab.com/2020/01/film/", "https://film-grab.com")
            .unwrap();

        assert_eq!(with_referer[header::REFERER], "https://film-grab.com/2020/01/film/");
        assert_eq!(with_referer[header::ORIGIN], "https://film-grab.com");
        assert_eq!(with_referer["sec-fetch-dest"], "image");
        assert_eq!(with_referer[header::USER_AGENT], BROWSER_USER_AGENT);

        let no_referer = HeaderProfile::NoReferer
            .headers("https://film-grab.com/", "https://film-grab.com")
            .unwrap();

        assert_eq!(no_referer[header::REFERER], "");
        assert!(no_referer.get(header::ORIGIN).is_none());
        assert!(no_referer.get("sec-fetch-site").is_none());
        assert_eq!(no_referer[header::ACCEPT], ACCEPT_IMAGE);

        let invalid = HeaderProfile::WithReferer.headers("bad\nreferer", "https://film-grab.com");
        assert!(invalid.is_err());
    }
}
