use std::net::SocketAddr;

use serde::de::DeserializeOwned;

use crate::Result;

pub static CONFIG_FILE: &'static str = "daybrief.toml";

/// Application configuration. Defines all the aspects of the newsletter
/// engine that are configurable at the deployment level.
///
/// # Sensible defaults
///
/// Configuration provided through `Config::default()` allows for a quick
/// local setup. Every secret-bearing field defaults to an empty value and
/// the affected subsystem fails closed: without smtp credentials dispatch
/// runs simulated, without an admin secret the operator surface rejects
/// everything, without a crypto key subscriber intake is refused.
///
/// Using the *struct update syntax* one can initialize a new `Config`,
/// making a few changes right in the definition.
///
/// ```ignore
/// let cfg = Config {
///     tracing: Tracing {
///         enabled: false,
///         ..Default::default()
///     },
///     ..Default::default()
/// }
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub name: String,
    pub version: String,

    /// Domain name pointing to the machine running the application.
    pub domain: String,
    /// Address on which to serve the application. Defaults to
    /// `127.0.0.1:8080`.
    pub address: SocketAddr,
    /// Base url embedded into outgoing emails for tracking links and the
    /// open pixel. Must be reachable from recipients' mail clients.
    pub public_url: String,

    /// Path to the document store.
    pub db_path: String,

    pub tracing: Tracing,

    pub admin: Admin,
    pub smtp: Smtp,
    pub crypto: Crypto,

    pub dispatch: Dispatch,
    pub metrics: Metrics,
    pub analytics: Analytics,

    /// List of initial subscribers.
    pub subscribers: Vec<InitSubscriber>,

    /// Development mode configuration.
    pub dev: DevMode,

    pub init: Init,
    /// Selectively enable/disable pre-made routes
    pub routes: Routes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            domain: "localhost".to_string(),
            address: "127.0.0.1:8080".parse().expect("valid default address"),
            public_url: "http://127.0.0.1:8080".to_string(),
            db_path: "./db".to_string(),
            tracing: Tracing::default(),
            admin: Admin::default(),
            smtp: Smtp::default(),
            crypto: Crypto::default(),
            dispatch: Dispatch::default(),
            metrics: Metrics::default(),
            analytics: Analytics::default(),
            subscribers: vec![],
            dev: DevMode::default(),
            init: Init::default(),
            routes: Routes::default(),
        }
    }
}

/// Loads application config from toml file at default location.
pub fn load<T: DeserializeOwned>() -> Result<T> {
    load_from(CONFIG_FILE)
}

/// Loads application config from toml file at standard path using provided
/// name.
///
/// For example for `name` == `daybrief.toml` we will load both
/// `daybrief.toml` and `secret.daybrief.toml` from the main project
/// directory. The secret file is the expected home for the admin secret,
/// smtp password and crypto key.
pub fn load_from<T: DeserializeOwned>(name: impl AsRef<str>) -> Result<T> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(name.as_ref()))
        .add_source(config::File::with_name(&format!("secret.{}", name.as_ref())).required(false))
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix_separator("__"),
        )
        .build()?;

    let config: T = config.try_deserialize()?;

    Ok(config)
}

/// Loads application config from multiple toml files at given paths.
pub fn load_from_many<T: DeserializeOwned>(paths: &[impl AsRef<str>]) -> Result<T> {
    let mut builder = config::Config::builder().add_source(
        config::Environment::default()
            .separator("__")
            .prefix_separator("__"),
    );

    for path in paths {
        builder = builder.add_source(config::File::with_name(path.as_ref()));
    }
    let config = builder.build()?;

    let config: T = config.try_deserialize()?;

    Ok(config)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Tracing {
    pub enabled: bool,

    pub mode: crate::tracing::Mode,
    pub level: crate::tracing::Level,

    pub loki_address: String,
    pub loki_token: String,
}

impl Default for Tracing {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: crate::tracing::Mode::default(),
            level: crate::tracing::Level::default(),
            loki_address: "".to_string(),
            loki_token: "".to_string(),
        }
    }
}

/// Operator access configuration.
///
/// The secret gates the whole operator surface. There is no built-in
/// default; leaving it empty disables operator routes entirely.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Admin {
    pub secret: String,
}

/// Smtp relay and sender identity used for outgoing mail.
///
/// With any of server/user/password missing, dispatch switches to
/// simulated mode: recipients are resolved and audited but nothing is
/// handed to a transport.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Smtp {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// Address that outgoing digests are sent from.
    pub sender: String,
}

impl Smtp {
    pub fn is_configured(&self) -> bool {
        !self.server.is_empty() && !self.user.is_empty() && !self.password.is_empty()
    }
}

impl Default for Smtp {
    fn default() -> Self {
        Self {
            server: "".to_string(),
            port: 587,
            user: "".to_string(),
            password: "".to_string(),
            sender: "".to_string(),
        }
    }
}

/// At-rest encryption key for subscriber addresses. Either 64 hex chars
/// or a raw 32 character string.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Crypto {
    pub key: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Dispatch {
    /// Only content ingested within this window is eligible for a digest.
    pub content_window_hours: i64,
    /// Upper bound on the content pool considered per dispatch.
    pub pool_size: usize,
    /// Number of top story slots per digest.
    pub top_stories: usize,
    /// Per-category cap in the category sections.
    pub category_cap: usize,
    /// Width of the concurrent send fan-out.
    pub concurrency: usize,
    /// Daily sending quota reported by the metrics endpoint.
    pub daily_limit: u64,
    /// Items returned by the public content feed.
    pub feed_limit: usize,

    /// Ordered category table used to group the remainder of the digest.
    /// An item lands in a category when the keyword occurs in its channel
    /// or title, case-insensitively. Items may match multiple categories.
    pub categories: Vec<Category>,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            content_window_hours: 24,
            pool_size: 30,
            top_stories: 3,
            category_cap: 5,
            concurrency: 10,
            daily_limit: 500,
            feed_limit: 6,
            categories: vec![
                Category::new("Politics", "politic"),
                Category::new("Economy", "econom"),
                Category::new("Society", "society"),
                Category::new("Tech", "tech"),
            ],
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Category {
    pub name: String,
    pub keyword: String,
}

impl Category {
    pub fn new(name: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keyword: keyword.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Metrics {
    /// Fixed reporting time zone for all day-bucketing.
    pub timezone: chrono_tz::Tz,
    /// Number of audit records returned in the history listing.
    pub history_limit: usize,
    /// Days covered by the send volume chart.
    pub chart_days: i64,
    /// Days covered by the web stats listing.
    pub web_days: i64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Seoul,
            history_limit: 100,
            chart_days: 7,
            web_days: 30,
        }
    }
}

/// External analytics sink. Disabled unless explicitly enabled and keyed.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Analytics {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl Default for Analytics {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api2.amplitude.com/2/httpapi".to_string(),
            api_key: "".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InitSubscriber {
    pub email: String,
    pub is_test: bool,
    pub channels: Vec<String>,
    pub categories: Vec<String>,
}

/// NOTE: make sure to disable on production.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DevMode {
    /// Global switch for all dev mode items.
    pub enabled: bool,
    /// Mocking flag for all the mocking behavior performed by this library.
    pub mock: bool,
    /// Regenerative mocking behavior controls whether to regenerate mocks
    /// that are already present in the database.
    pub mock_regen: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Init {
    pub enabled: bool,
}

impl Default for Init {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Routes {
    pub enable: Vec<String>,
    pub disable: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_closed() {
        let config = Config::default();
        assert!(config.admin.secret.is_empty());
        assert!(config.crypto.key.is_empty());
        assert!(!config.smtp.is_configured());
        assert!(!config.analytics.enabled);
    }

    #[test]
    fn dispatch_defaults() {
        let dispatch = Dispatch::default();
        assert_eq!(dispatch.daily_limit, 500);
        assert_eq!(dispatch.top_stories, 3);
        assert_eq!(dispatch.category_cap, 5);
        assert_eq!(dispatch.feed_limit, 6);
        assert!(!dispatch.categories.is_empty());
    }

    #[test]
    fn reporting_zone_defaults_to_utc_plus_nine() {
        let metrics = Metrics::default();
        assert_eq!(metrics.timezone, chrono_tz::Asia::Seoul);
    }

    #[test]
    fn smtp_configured_needs_credentials() {
        let smtp = Smtp {
            server: "smtp.example.com".to_string(),
            user: "mailer".to_string(),
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(smtp.is_configured());

        let partial = Smtp {
            server: "smtp.example.com".to_string(),
            ..Default::default()
        };
        assert!(!partial.is_configured());
    }
}
