mod dispatch;
mod stats;
mod subscribers;

use std::time::Duration;

use clap::{Arg, Command};
use daybrief::{config, Config};
use tokio_util::sync::CancellationToken;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // If executed in a context where a config file is available then
    // additional context will be picked up, such as the server address and
    // the database path. The config file path can also be provided through
    // the `--config` argument.
    let mut config: Config = config::load().unwrap_or_default();

    let matches = cmd().get_matches();

    // Load the proper config if proper argument is provided.
    if let Some(config_path) = matches.get_one::<String>("config") {
        config = config::load_from(config_path)?;
    }

    match matches.subcommand() {
        Some(("dispatch", m)) => dispatch::run(m, &config, cancel.clone()).await?,
        Some(("stats", m)) => stats::run(m, &config, cancel.clone()).await?,
        Some(("subscribers", m)) => subscribers::run(m, &config, cancel.clone()).await?,
        _ => unimplemented!(),
    }

    // Wait for either ctrl_c signal or message from within command task(s)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("Initiating graceful shutdown...");
            cancel.cancel();
        },
        _ = cancel.cancelled() => {},
    }

    tokio::time::sleep(Duration::from_millis(300)).await;

    Ok(())
}

pub fn cmd() -> Command {
    Command::new("daybrief")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .infer_subcommands(true)
        .version(VERSION)
        .about("Operate a daybrief dispatch engine")
        .subcommand(dispatch::cmd())
        .subcommand(stats::cmd())
        .subcommand(subscribers::cmd())
        .arg(Arg::new("config").long("config").value_name("PATH"))
}
