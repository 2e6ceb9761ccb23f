use crate::{http, server};
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct Config {
    pub(crate) server: server::Config,
    pub(crate) upstream: http::Config,
}

impl Config {
    pub fn load_or_panic() -> Config {
        Self {
            server: from_env_or_panic(""),
            upstream: from_env_or_panic("UPSTREAM_"),
        }
    }
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}
