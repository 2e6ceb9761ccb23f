use super::{SnapshotFormat, Style};
use expect_test::Expect;
use std::fmt;

struct Imp;

impl<T: fmt::Debug> SnapshotFormat<T> for Imp {
    fn make_snapshot_imp(style: Style, actual: &T) -> String {
        match style {
            Style::Terse => format!("{actual:?}"),
            Style::Verbose => format!("{actual:#?}"),
        }
    }
}

/// Asserts that the [`fmt::Debug`] representation of `actual` is equal to the
/// given expected snapshot. Uses [`make_snapshot`] to make the
/// snapshot fit into a common width of a single screen.
#[track_caller]
pub fn assert_eq<T: fmt::Debug>(actual: T, expected: &Expect) {
    Imp::assert_eq(&actual, expected)
}

/// Formats `actual` using its [`fmt::Debug`] implementation. Switches to the
/// pretty `#` formatting if the single-line form is wider than a screen.
pub fn make_snapshot<T: fmt::Debug>(actual: T) -> String {
    Imp::make_snapshot(&actual)
}
