//! Data initialization procedures.
//!
//! The app config can list subscribers expected to exist after the
//! application is started. This module converts those entries into initial
//! database state.

use crate::crypto::Sealer;
use crate::subscriber::{self, Preferences, Subscriber};
use crate::{Config, Database, ErrorKind, Result};

/// Initializes database state based on entries found in the configuration.
pub fn initialize(config: &Config, db: &Database) -> Result<()> {
    subscribers(config, db)?;
    Ok(())
}

/// Registers subscribers from entries found in the configuration.
///
/// Registration is idempotent, so entries whose address already exists keep
/// their id and only have the test flag reconciled with the config.
pub fn subscribers(config: &Config, db: &Database) -> Result<()> {
    if config.subscribers.is_empty() {
        return Ok(());
    }
    let sealer = Sealer::from_config(&config.crypto);
    for entry in &config.subscribers {
        let preferences = Preferences {
            channels: entry.channels.clone(),
            categories: entry.categories.clone(),
        };
        let registered = match subscriber::register(db, &sealer, &entry.email, preferences) {
            Ok(subscriber) => subscriber,
            Err(error) if matches!(error.kind, ErrorKind::CryptoKeyMissing) => {
                log::warn!("skipping configured subscribers, no crypto key is set");
                return Ok(());
            }
            Err(error) => {
                log::warn!("skipping configured subscriber {}: {error}", entry.email);
                continue;
            }
        };
        if registered.is_test != entry.is_test {
            db.update::<Subscriber, _>(registered.id, |subscriber| {
                subscriber.is_test = entry.is_test
            })?;
        }
    }
    Ok(())
}
