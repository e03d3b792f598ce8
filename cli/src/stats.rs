use anyhow::Result;
use clap::ArgMatches;
use tokio_util::sync::CancellationToken;

use daybrief::{metrics, Config, Database};

pub fn cmd() -> clap::Command {
    clap::Command::new("stats")
        .about("Print the engagement overview from the local database")
        .display_order(20)
}

pub async fn run(_matches: &ArgMatches, config: &Config, cancel: CancellationToken) -> Result<()> {
    let db = Database::new_at(&config.db_path)?;
    let overview = metrics::overview(&db, config)?;
    println!("{}", serde_json::to_string_pretty(&overview)?);

    cancel.cancel();

    Ok(())
}
