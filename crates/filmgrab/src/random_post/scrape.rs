use crate::prelude::*;
use itertools::Itertools;
use lazy_regex::{regex_is_match, Lazy};
use scraper::{ElementRef, Html, Selector};

macro_rules! selector {
    ($css:literal) => {{
        static SELECTOR: Lazy<Selector> = Lazy::new(|| {
            Selector::parse($css)
                .unwrap_or_else(|err| panic!("BUG: invalid CSS selector {}: {err:?}", $css))
        });
        &*SELECTOR
    }};
}

/// Metadata of the gallery post extracted from its HTML page
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ScrapedPost {
    pub(crate) title: Option<String>,
    pub(crate) credits: Option<String>,

    /// Absolute image URLs without duplicates in the order of appearance
    pub(crate) images: Vec<String>,
}

pub(crate) fn scrape_post(html: &str) -> ScrapedPost {
    let document = Html::parse_document(html);

    let title = document
        .select(selector!(
            "h1.entry-title, h2.entry-title, h3.entry-title, \
             h4.entry-title, h5.entry-title, h6.entry-title"
        ))
        .next()
        .and_then(collapsed_text)
        .or_else(|| {
            document
                .select(selector!("title"))
                .next()
                .and_then(collapsed_text)
        });

    let content = document.select(selector!("div.entry-content")).next();

    let credits = content
        .and_then(|content| content.select(selector!("p")).next())
        .and_then(collapsed_text);

    let image_elements: Vec<ElementRef<'_>> = match content {
        Some(content) => content.select(selector!("img")).collect(),
        None => document.select(selector!("img")).collect(),
    };

    let images = image_elements
        .into_iter()
        .filter_map(best_image_url)
        .filter(|url| is_image_url(url))
        .unique()
        .map_collect(ToOwned::to_owned);

    ScrapedPost {
        title,
        credits,
        images,
    }
}

/// Text content of the element with all whitespace sequences replaced with
/// a single space. Returns [`None`] if there is no text.
fn collapsed_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().flat_map(str::split_whitespace).join(" ");
    (!text.is_empty()).then_some(text)
}

/// Picks the highest quality URL the `<img>` element refers to
fn best_image_url(img: ElementRef<'_>) -> Option<&str> {
    let attr = |name| img.value().attr(name).filter(|value| !value.is_empty());

    attr("data-full-url")
        .or_else(|| attr("srcset").and_then(largest_srcset_candidate))
        .or_else(|| attr("src"))
}

/// The candidates in `srcset` are conventionally listed in ascending order
/// of their size, so the last one is the largest.
fn largest_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .last()
}

fn is_image_url(url: &str) -> bool {
    regex_is_match!(r"^https?://"i, url) && regex_is_match!(r"\.(jpe?g|png|webp)(\?|$)"i, url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn smoke() {
        let html = r#"
            <html>
            <head><title>Example Film – FilmGrab</title></head>
            <body>
                <h1 class="entry-title">Example   Film</h1>
                <div class="entry-content">
                    <p>Credits: X</p>
                    <p>Another paragraph</p>
                    <img src="https://film-grab.com/wp-content/uploads/a.jpg">
                    <img src="https://film-grab.com/wp-content/uploads/a.jpg">
                    <img
                        src="https://film-grab.com/wp-content/uploads/b-300x200.jpg"
                        data-full-url="https://film-grab.com/wp-content/uploads/b.jpg"
                    >
                </div>
            </body>
            </html>
        "#;

        test_bat::debug::assert_eq(
            scrape_post(html),
            &expect![[r#"
                ScrapedPost {
                    title: Some(
                        "Example Film",
                    ),
                    credits: Some(
                        "Credits: X",
                    ),
                    images: [
                        "https://film-grab.com/wp-content/uploads/a.jpg",
                        "https://film-grab.com/wp-content/uploads/b.jpg",
                    ],
                }"#]],
        );
    }

    #[test]
    fn title_falls_back_to_document_title() {
        let html = r#"
            <html>
            <head><title>
                Random   Film
            </title></head>
            <body><h1 class="entry-title">   </h1></body>
            </html>
        "#;

        assert_eq!(scrape_post(html).title.as_deref(), Some("Random Film"));
    }

    #[test]
    fn title_strips_nested_tags() {
        let html = r#"
            <h2 class="post entry-title"><a href="/film/">Blade <em>Runner</em></a></h2>
        "#;

        assert_eq!(scrape_post(html).title.as_deref(), Some("Blade Runner"));
    }

    #[test]
    fn no_entry_content() {
        let html = r#"
            <title>Film</title>
            <p>Not credits</p>
            <img src="https://film-grab.com/outside.png">
        "#;

        test_bat::debug::assert_eq(
            scrape_post(html),
            &expect![[r#"
                ScrapedPost {
                    title: Some(
                        "Film",
                    ),
                    credits: None,
                    images: [
                        "https://film-grab.com/outside.png",
                    ],
                }"#]],
        );
    }

    #[test]
    fn images_are_scoped_to_entry_content() {
        let html = r#"
            <img src="https://film-grab.com/logo.png">
            <div class="entry-content">
                <img src="https://film-grab.com/still.webp">
            </div>
            <img src="https://film-grab.com/footer.png">
        "#;

        assert_eq!(
            scrape_post(html).images,
            ["https://film-grab.com/still.webp"]
        );
    }

    #[test]
    fn srcset_largest_candidate() {
        let html = r#"
            <div class="entry-content">
                <img
                    src="https://film-grab.com/a-150.jpg"
                    srcset="https://film-grab.com/a-300.jpg 300w, https://film-grab.com/a-1024.jpg 1024w,
                            https://film-grab.com/a-1920.jpg 1920w"
                >
                <img src="https://film-grab.com/b.jpg" srcset="">
            </div>
        "#;

        expect![[r#"
            [
                "https://film-grab.com/a-1920.jpg",
                "https://film-grab.com/b.jpg",
            ]
        "#]]
        .assert_debug_eq(&scrape_post(html).images);
    }

    #[test]
    fn image_url_filtering() {
        let html = r#"
            <div class="entry-content">
                <img src="https://film-grab.com/fallback.jpg" data-full-url="/relative/full.jpg">
                <img srcset="//cdn.film-grab.com/protocol-relative.jpg 2x">
                <img src="https://film-grab.com/animation.gif">
                <img src="data:image/png;base64,iVBORw0KGgo=">
                <img src="ftp://film-grab.com/still.jpg">
                <img src="HTTPS://FILM-GRAB.COM/UPPER.JPEG">
                <img src="https://film-grab.com/with-query.png?resize=1024%2C576&amp;ssl=1">
                <img src="https://film-grab.com/still.jpg.html">
                <img src="http://film-grab.com/plain-http.webp">
            </div>
        "#;

        expect![[r#"
            [
                "HTTPS://FILM-GRAB.COM/UPPER.JPEG",
                "https://film-grab.com/with-query.png?resize=1024%2C576&ssl=1",
                "http://film-grab.com/plain-http.webp",
            ]
        "#]]
        .assert_debug_eq(&scrape_post(html).images);
    }

    #[test]
    fn empty_document() {
        assert_eq!(scrape_post(""), ScrapedPost::default());
    }
}
