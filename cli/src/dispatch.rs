use anyhow::{anyhow, Result};
use clap::{builder::PossibleValue, Arg, ArgMatches};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use daybrief::dispatch::{DispatchRequest, TargetGroup};
use daybrief::{routes, Config};

pub fn cmd() -> clap::Command {
    clap::Command::new("dispatch")
        .about("Trigger a dispatch on a running server")
        .display_order(10)
        .arg(
            Arg::new("mode")
                .value_parser([
                    PossibleValue::new("all"),
                    PossibleValue::new("individual"),
                    PossibleValue::new("group"),
                ])
                .default_value("all")
                .help("Recipient resolution mode"),
        )
        .arg(
            Arg::new("subscriber")
                .long("subscriber")
                .short('s')
                .value_name("ID")
                .help("Subscriber id, required for individual mode"),
        )
        .arg(
            Arg::new("group")
                .long("group")
                .short('g')
                .value_parser([
                    PossibleValue::new("all"),
                    PossibleValue::new("test"),
                    PossibleValue::new("production"),
                ])
                .help("Target group for group mode"),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .value_name("URL")
                .help("Server base url, defaults to the configured bind address"),
        )
        .arg(
            Arg::new("secret")
                .long("secret")
                .value_name("SECRET")
                .help("Operator secret, prompted for interactively when omitted"),
        )
}

/// Logs into the target server and posts a dispatch request, reusing the
/// session cookie from the login response.
pub async fn run(matches: &ArgMatches, config: &Config, cancel: CancellationToken) -> Result<()> {
    let request = request_from(matches)?;

    let address = match matches.get_one::<String>("address") {
        Some(address) => address.trim_end_matches('/').to_string(),
        None => format!("http://{}", config.address),
    };
    let secret = match matches.get_one::<String>("secret") {
        Some(secret) => secret.to_string(),
        None => rpassword::prompt_password("Operator secret: ")?,
    };

    let client = reqwest::Client::builder().cookie_store(true).build()?;
    let login = client
        .post(format!("{address}{}", routes::ADMIN_LOGIN))
        .json(&serde_json::json!({ "password": secret }))
        .send()
        .await?;
    if !login.status().is_success() {
        return Err(anyhow!("login rejected with {}", login.status()));
    }

    let response = client
        .post(format!("{address}{}", routes::DISPATCH))
        .json(&request)
        .send()
        .await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        return Err(anyhow!("dispatch failed with {status}: {body}"));
    }
    println!("{}", serde_json::to_string_pretty(&body)?);

    cancel.cancel();

    Ok(())
}

fn request_from(matches: &ArgMatches) -> Result<DispatchRequest> {
    let request = match matches.get_one::<String>("mode").map(|m| m.as_str()) {
        Some("individual") => {
            let id = matches
                .get_one::<String>("subscriber")
                .ok_or_else(|| anyhow!("individual mode needs --subscriber"))?;
            DispatchRequest::individual(Uuid::parse_str(id)?)
        }
        Some("group") => {
            let group = match matches.get_one::<String>("group").map(|g| g.as_str()) {
                Some("test") => TargetGroup::Test,
                Some("production") => TargetGroup::Production,
                _ => TargetGroup::All,
            };
            DispatchRequest::group(group)
        }
        _ => DispatchRequest::all(),
    };
    Ok(request)
}
