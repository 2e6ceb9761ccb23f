use std::fmt;
use std::time::Duration;

/// Records the error as a `dyn Error` field, so subscribers can render its sources
#[must_use]
pub fn tracing_err<'a, E: std::error::Error + 'static>(err: &'a E) -> impl tracing::Value + 'a {
    err as &dyn std::error::Error
}

/// Renders the duration with two decimals in the most fitting unit,
/// e.g. `1.50ms` or `20.25s`.
pub(crate) fn tracing_duration(duration: Duration) -> impl tracing::Value {
    tracing::field::display(DisplayDuration(duration))
}

struct DisplayDuration(Duration);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2?}", self.0)
    }
}
