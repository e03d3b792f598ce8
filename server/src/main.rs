//! Standalone dispatch engine server exposing all pre-made routes.
//!
//! Runs with defaults when no `daybrief.toml` is found, in which case
//! dispatches are simulated and operator routes stay locked.

use axum::routing::get;

use daybrief::{config, Config, Router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: Config = config::load().unwrap_or_default();

    let router = Router::new().route("/", get(home));
    let router = daybrief::router(router, &config);

    daybrief::axum::start(router, config).await?;

    Ok(())
}

async fn home() -> &'static str {
    concat!("daybrief ", env!("CARGO_PKG_VERSION"))
}
