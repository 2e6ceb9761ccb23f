mod ext;
mod macros;

use crate::prelude::*;
use crate::util::DynError;
use axum::http::StatusCode;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing_error::SpanTrace;

pub(crate) use macros::*;

pub(crate) mod prelude {
    pub(crate) use super::ext::{OptionExt as _, ResultExt as _};
    pub(crate) use super::{err, err_ctx, fatal};
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Describes any possible error that may happen in the application lifetime.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    /// Small identifier used for debugging purposes.
    /// It is mentioned in the logs of the failed request, so that the
    /// developers could look up the context of the error by its id.
    id: String,
    kind: ErrorKind,

    // Participates only in debug impl
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    Proxy {
        #[from]
        source: crate::proxy::ProxyError,
    },

    #[error(transparent)]
    RandomPost {
        #[from]
        source: crate::random_post::RandomPostError,
    },

    #[error(transparent)]
    HttpClient {
        #[from]
        source: crate::http::HttpClientError,
    },

    /// Unrecoverable kind of error, that is not supposed to happen, but when
    /// it happens we can't do anything reasonable about it, so no structural
    /// error handling is possible, this error is just propagated to the top.
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl Error {
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }

    /// Errors caused by the caller sending wrong input.
    pub(crate) fn is_user_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// HTTP status code that describes this error to the caller
    pub(crate) fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Proxy { source } => source.status_code(),
            ErrorKind::RandomPost { .. }
            | ErrorKind::HttpClient { .. }
            | ErrorKind::Fatal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to show to the caller. It doesn't include the
    /// error id, but includes the chain of the underlying causes.
    pub(crate) fn public_message(&self) -> String {
        self.kind().display_chain().to_string()
    }

    /// Logs the error with the severity based on whether it was caused by
    /// the caller or by the server.
    pub(crate) fn log(&self, message: &str) {
        let status = self.status_code();
        if self.is_user_error() {
            warn!(err = tracing_err(self), %status, "{message}");
        } else {
            error!(err = tracing_err(self), %status, "{message}");
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error (id: {}): {}", self.imp.id, self.imp.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.imp.kind.source()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let imp = ErrorImp {
            kind: kind.into(),
            id: nanoid::nanoid!(6),
            spantrace: SpanTrace::capture(),
        };

        let err = Self { imp: Arc::new(imp) };

        trace!(err = tracing_err(&err), "Created an error");

        err
    }
}
