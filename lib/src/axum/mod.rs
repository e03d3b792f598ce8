pub mod auth;
pub mod contents;
pub mod dispatch;
pub mod extract;
pub mod metrics;
pub mod subscribers;
pub mod track;

pub use extract::{ClientMeta, OperatorSession};

use std::sync::Arc;

use axum::Extension;

use crate::Result;
use crate::{Config, Database};

pub type Router = axum::Router;

pub type ConfigExt<C = Config> = Extension<Arc<C>>;
pub type DbExt = Extension<Arc<Database>>;

/// Registers engine routes on the provided router.
///
/// Meant to be used if there is a need to register custom middleware that
/// will run on engine routes.
///
/// # Configurable routes
///
/// It's possible to customize the routes registered with this function
/// through relevant config declarations. This is helpful in cases where we
/// want to still register the same route with the same handler but also
/// add a middleware layer on top of that route.
pub fn router(mut router: Router, config: &Config) -> Router {
    router = conditional_merge("dispatch", router, dispatch::router(), config);
    router = conditional_merge("metrics", router, metrics::router(), config);
    router = conditional_merge("track", router, track::router(), config);
    router = conditional_merge("subscribers", router, subscribers::router(), config);
    router = conditional_merge("contents", router, contents::router(), config);
    conditional_merge("auth", router, auth::router(), config)
}

fn conditional_merge(route: &str, routera: Router, routerb: Router, config: &Config) -> Router {
    if config.routes.enable.contains(&route.to_string())
        || !config.routes.disable.contains(&route.to_string())
    {
        routera.merge(routerb)
    } else {
        routera
    }
}

/// Wires application state onto the router. The test suites drive the
/// result directly through `tower::ServiceExt`.
pub fn app(router: Router, db: Database, config: Config) -> Router {
    router
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(Extension(Arc::new(config)))
        .layer(Extension(Arc::new(db)))
}

/// Registers engine routes on the provided router, initializes
/// application state and starts the web server.
pub async fn start(router: Router, config: Config) -> Result<()> {
    let db = Database::new_at(&config.db_path)?;
    start_with(db, router, config).await
}

pub async fn start_with(db: Database, router: Router, config: Config) -> Result<()> {
    crate::tracing::init(&config).unwrap_or_else(|e| {
        log::warn!("failed to initialize tracing (perhaps it was already initialized?): {e}")
    });

    // Provide initial state as defined in config
    if config.init.enabled {
        crate::init::initialize(&config, &db)?;
    }

    // Generate mock data for local development.
    if config.dev.enabled && config.dev.mock {
        crate::mock::generate(&config, &db)?;
    }

    let addr = config.address;
    let router = app(router, db, config);

    tracing::info!("starting server at {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| e.into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping server");
}
