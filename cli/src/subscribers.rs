use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use daybrief::crypto::Sealer;
use daybrief::subscriber::{self, Preferences, Subscriber};
use daybrief::{Config, Database};

pub fn cmd() -> clap::Command {
    clap::Command::new("subscribers")
        .subcommand_required(true)
        .about("Manage subscribers in the local database")
        .display_order(30)
        .subcommand(clap::Command::new("list").about("List subscribers with masked addresses"))
        .subcommand(
            clap::Command::new("add")
                .arg_required_else_help(true)
                .about("Register a subscriber")
                .arg(Arg::new("email").required(true))
                .arg(
                    Arg::new("channels")
                        .long("channels")
                        .value_delimiter(',')
                        .help("Preferred channels, comma separated"),
                )
                .arg(
                    Arg::new("test")
                        .long("test")
                        .action(ArgAction::SetTrue)
                        .help("Flag the subscriber as a test recipient"),
                ),
        )
        .subcommand(
            clap::Command::new("rm")
                .arg_required_else_help(true)
                .about("Remove a subscriber")
                .arg(Arg::new("id").required(true)),
        )
}

pub async fn run(matches: &ArgMatches, config: &Config, cancel: CancellationToken) -> Result<()> {
    let db = Database::new_at(&config.db_path)?;
    let sealer = Sealer::from_config(&config.crypto);

    match matches.subcommand() {
        Some(("list", _)) => {
            for entry in subscriber::masked(&db, &sealer)? {
                println!(
                    "{}  {}  {}  test={}",
                    entry.id, entry.email, entry.status, entry.is_test
                );
            }
        }
        Some(("add", m)) => {
            let email = m
                .get_one::<String>("email")
                .ok_or_else(|| anyhow!("email is required"))?;
            let channels = m
                .get_many::<String>("channels")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            let preferences = Preferences {
                channels,
                categories: vec![],
            };
            let registered = subscriber::register(&db, &sealer, email, preferences)?;
            if m.get_flag("test") {
                db.update::<Subscriber, _>(registered.id, |s| s.is_test = true)?;
            }
            println!("{}", registered.id);
        }
        Some(("rm", m)) => {
            let id = m
                .get_one::<String>("id")
                .ok_or_else(|| anyhow!("id is required"))?;
            let id = Uuid::parse_str(id)?;
            let found = db
                .get_opt::<Subscriber>(id)?
                .ok_or_else(|| anyhow!("no subscriber with id {id}"))?;
            db.remove(&found)?;
        }
        _ => unimplemented!(),
    }

    cancel.cancel();

    Ok(())
}
