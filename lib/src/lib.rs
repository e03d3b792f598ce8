//! daybrief is a small self-hosted engine for running a daily digest
//! newsletter: it resolves recipients, personalizes and renders recent
//! content into an email, dispatches it in bulk and then measures
//! engagement well enough to drive an operator dashboard and a daily
//! sending quota.
//!
//! The library exposes everything as composable pieces. A minimal server
//! is a config load, a router merge and a call to [`axum::start`]:
//!
//! ```ignore
//! let config: daybrief::Config = daybrief::config::load()?;
//! let router = daybrief::router(daybrief::Router::new(), &config);
//! daybrief::axum::start(router, config).await?;
//! ```

#[macro_use]
extern crate serde_derive;

pub mod analytics;
pub mod axum;
pub mod config;
pub mod content;
pub mod crypto;
pub mod db;
pub mod digest;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod init;
pub mod metrics;
pub mod mock;
pub mod render;
pub mod routes;
pub mod subscriber;
pub mod time;
pub mod track;
pub mod tracing;

pub use crate::axum::{router, Router};
pub use config::Config;
pub use content::ContentItem;
pub use db::Database;
pub use dispatch::MailDispatch;
pub use error::{Error, ErrorKind, Result};
pub use subscriber::Subscriber;
pub use time::Stamp;
