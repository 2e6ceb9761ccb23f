use easy_ext::ext;

#[ext(UrlExt)]
pub(crate) impl ::url::Url {
    /// Host of the URL including the port if it isn't the default one for the
    /// scheme. Empty string for URLs that have no host at all.
    fn host_with_port(&self) -> String {
        let host = self.host_str().unwrap_or_default();
        match self.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    fn upgrade_to_https(mut self) -> Self {
        if self.scheme() == "http" {
            // Switching between special schemes never fails
            let _ = self.set_scheme("https");
        }
        self
    }
}

/// Replaces the `http` scheme with `https`. The input is returned as is if
/// it isn't a valid absolute URL.
pub(crate) fn upgrade_to_https(url: &str) -> String {
    match ::url::Url::parse(url) {
        Ok(url) => url.upgrade_to_https().into(),
        Err(_) => url.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn https_upgrade() {
        let test = |input: &str, expected: expect_test::Expect| {
            expected.assert_eq(&upgrade_to_https(input));
        };

        test(
            "http://film-grab.com/wp-content/uploads/2020/01/a.jpg",
            expect!["https://film-grab.com/wp-content/uploads/2020/01/a.jpg"],
        );
        test(
            "https://film-grab.com/a.png?w=10",
            expect!["https://film-grab.com/a.png?w=10"],
        );
        test("not a url", expect!["not a url"]);
    }

    #[test]
    fn host_with_port() {
        let url: ::url::Url = "http://example.com:8080/a.jpg".parse().unwrap();
        assert_eq!(url.host_with_port(), "example.com:8080");

        let url: ::url::Url = "https://example.com:443/a.jpg".parse().unwrap();
        assert_eq!(url.host_with_port(), "example.com");
    }
}
