//! Snapshot testing helpers on top of [`expect_test`]

pub mod debug;

use expect_test::Expect;

/// Approximate number of characters that can fit on a single screen
const COMMON_SCREEN_CHARS_WIDTH: usize = 60;

#[derive(Clone, Copy)]
enum Style {
    /// Everything on a single line
    Terse,

    /// Multiline pretty-printed representation
    Verbose,
}

trait SnapshotFormat<T: ?Sized> {
    fn make_snapshot_imp(style: Style, actual: &T) -> String;

    fn make_snapshot(actual: &T) -> String {
        let terse = Self::make_snapshot_imp(Style::Terse, actual);

        let Some(width) = terse.lines().map(str::len).max() else {
            return terse;
        };

        if width >= COMMON_SCREEN_CHARS_WIDTH {
            return Self::make_snapshot_imp(Style::Verbose, actual);
        }

        terse
    }

    #[track_caller]
    fn assert_eq(actual: &T, expected: &Expect) {
        expected.assert_eq(&Self::make_snapshot(actual));
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Still {
        film: &'static str,
        url: &'static str,
    }

    #[test]
    fn short_values_stay_on_one_line() {
        crate::debug::assert_eq(Some(42), &expect!["Some(42)"]);
    }

    #[test]
    fn long_values_are_pretty_printed() {
        let still = Still {
            film: "Example Film",
            url: "https://film-grab.com/wp-content/uploads/still.jpg",
        };

        crate::debug::assert_eq(
            still,
            &expect![[r#"
                Still {
                    film: "Example Film",
                    url: "https://film-grab.com/wp-content/uploads/still.jpg",
                }"#]],
        );
    }
}
