mod config;
mod error;
mod http;
mod observability;
mod proxy;
mod random_post;
mod server;

pub mod util;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the HTTP server until Ctrl+C is received
pub async fn run(config: Config) -> Result<()> {
    let upstream = http::ReqwestUpstream::new(&config.upstream)?;
    let state = server::AppState::new(config.clone(), upstream);

    server::serve(config.server, state).await
}
