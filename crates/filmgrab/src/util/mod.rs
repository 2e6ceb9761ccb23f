//! Assorted utility functions (missing batteries).
mod std_ext;

pub mod url;

pub(crate) use std_ext::*;

pub(crate) mod prelude {
    pub(crate) use super::std_ext::prelude::*;
    pub(crate) use super::url::UrlExt as _;
}

pub(crate) type DynError = dyn std::error::Error + Send + Sync;
