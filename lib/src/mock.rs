//! Module tasked with generating mock data to populate the application.

use chrono::{Duration, Utc};

use crate::content::ContentItem;
use crate::crypto::Sealer;
use crate::subscriber::{self, Preferences, Subscriber};
use crate::{Config, Database, Result};

/// Generates and saves various mocking data in the database.
pub fn generate(config: &Config, db: &Database) -> Result<()> {
    contents(config, db)?;
    subscribers(config, db)?;

    Ok(())
}

/// A small content pool spanning a few channels, fresh enough to land
/// inside the default dispatch window.
pub fn contents(config: &Config, db: &Database) -> Result<()> {
    // do sample contents already exist
    if !db.get_collection::<ContentItem>()?.is_empty() && !config.dev.mock_regen {
        return Ok(());
    }

    let samples = [
        ("Sample launch roundup", "Tech", 4200, 1),
        ("Sample funding recap", "Startup", 2800, 2),
        ("Sample design teardown", "Design", 1900, 3),
        ("Sample weekend reads", "Culture", 950, 5),
        ("Sample tooling digest", "Tech", 640, 8),
    ];
    for (title, channel, views, age_hours) in samples {
        let item = ContentItem {
            title: title.to_string(),
            url: format!(
                "https://example.com/{}",
                title.to_lowercase().replace(' ', "-")
            ),
            channel: channel.to_string(),
            views,
            ingested_at: Utc::now() - Duration::hours(age_hours),
            ..Default::default()
        };
        db.set(&item)?;
    }

    Ok(())
}

/// Registers a pair of test-flagged subscribers so dev dispatches have a
/// target group to hit.
pub fn subscribers(config: &Config, db: &Database) -> Result<()> {
    if !db.get_collection::<Subscriber>()?.is_empty() && !config.dev.mock_regen {
        return Ok(());
    }

    let sealer = Sealer::from_config(&config.crypto);
    let samples = [
        ("mock-a@example.com", vec!["Tech".to_string()]),
        ("mock-b@example.com", vec![]),
    ];
    for (email, channels) in samples {
        let preferences = Preferences {
            channels,
            categories: vec![],
        };
        let registered = match subscriber::register(db, &sealer, email, preferences) {
            Ok(subscriber) => subscriber,
            Err(error) => {
                log::warn!("skipping mock subscriber {email}: {error}");
                continue;
            }
        };
        db.update::<Subscriber, _>(registered.id, |subscriber| subscriber.is_test = true)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn generate_is_idempotent_without_regen() {
        let db = Database::temporary().unwrap();
        let mut config = Config::default();
        config.crypto.key = KEY.to_string();

        generate(&config, &db).unwrap();
        let contents = db.get_collection::<ContentItem>().unwrap().len();
        let subscribers = db.get_collection::<Subscriber>().unwrap().len();
        assert!(contents > 0);
        assert_eq!(subscribers, 2);

        generate(&config, &db).unwrap();
        assert_eq!(db.get_collection::<ContentItem>().unwrap().len(), contents);
        assert_eq!(db.get_collection::<Subscriber>().unwrap().len(), subscribers);
    }

    #[test]
    fn mock_subscribers_are_test_flagged() {
        let db = Database::temporary().unwrap();
        let mut config = Config::default();
        config.crypto.key = KEY.to_string();

        generate(&config, &db).unwrap();
        assert!(db
            .get_collection::<Subscriber>()
            .unwrap()
            .iter()
            .all(|s| s.is_test));
    }

    #[test]
    fn missing_key_still_generates_contents() {
        let db = Database::temporary().unwrap();
        let config = Config::default();

        generate(&config, &db).unwrap();
        assert!(!db.get_collection::<ContentItem>().unwrap().is_empty());
        assert!(db.get_collection::<Subscriber>().unwrap().is_empty());
    }
}
