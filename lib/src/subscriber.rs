//! Subscriber storage and the recipient resolver.
//!
//! Addresses live sealed in the store and only ever leave it in masked
//! form; the resolver is the single place plaintext addresses are
//! materialized, in memory, for the duration of a dispatch.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::crypto::{self, Sealer};
use crate::db::{Collectable, Identifiable};
use crate::dispatch::{DispatchMode, DispatchRequest, TargetGroup};
use crate::error::ErrorKind;
use crate::{Database, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Channels the subscriber wants prioritized in their top stories.
    pub channels: Vec<String>,
    /// Self-declared interest categories. Collected at onboarding; not
    /// used by selection yet.
    pub categories: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,

    /// Sealed address, never plaintext.
    pub address: String,

    pub status: Status,
    /// Routes the subscriber to test sends instead of production ones.
    pub is_test: bool,

    pub preferences: Preferences,

    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(sealed_address: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: sealed_address,
            status: Status::Active,
            is_test: false,
            preferences: Preferences::default(),
            created_at: Utc::now(),
        }
    }
}

impl Collectable for Subscriber {
    fn get_collection_name() -> &'static str {
        "subscribers"
    }
}

impl Identifiable for Subscriber {
    fn get_id(&self) -> Uuid {
        self.id
    }
}

/// One resolved, addressable recipient of a dispatch.
#[derive(Clone, Debug)]
pub struct Recipient {
    pub id: Uuid,
    pub address: String,
    pub preferences: Preferences,
}

/// Turns a dispatch request into the concrete recipient list. Read-only;
/// an empty result is a valid outcome that callers treat as a no-op.
pub fn resolve(db: &Database, sealer: &Sealer, request: &DispatchRequest) -> Result<Vec<Recipient>> {
    match request.mode {
        DispatchMode::Individual => {
            let id = request
                .subscriber_id
                .ok_or_else(|| ErrorKind::BadInput("subscriberId is required".to_string()))?;
            let subscriber = db
                .get_opt::<Subscriber>(id)?
                .ok_or(ErrorKind::SubscriberNotFound(id))?;
            match sealer.open(&subscriber.address) {
                Some(address) => Ok(vec![Recipient {
                    id: subscriber.id,
                    address,
                    preferences: subscriber.preferences,
                }]),
                None => {
                    tracing::warn!(subscriber = %subscriber.id, "stored address cannot be opened, skipping");
                    Ok(vec![])
                }
            }
        }
        DispatchMode::Group | DispatchMode::All => {
            let group = request.target_group;
            let mut recipients = Vec::new();
            for subscriber in db.get_collection::<Subscriber>()? {
                if subscriber.status != Status::Active {
                    continue;
                }
                if !in_target_group(&subscriber, group) {
                    continue;
                }
                match sealer.open(&subscriber.address) {
                    Some(address) => recipients.push(Recipient {
                        id: subscriber.id,
                        address,
                        preferences: subscriber.preferences,
                    }),
                    None => {
                        tracing::warn!(subscriber = %subscriber.id, "stored address cannot be opened, skipping")
                    }
                }
            }
            Ok(recipients)
        }
    }
}

fn in_target_group(subscriber: &Subscriber, group: Option<TargetGroup>) -> bool {
    match group {
        Some(TargetGroup::Test) => subscriber.is_test,
        Some(TargetGroup::Production) => !subscriber.is_test,
        Some(TargetGroup::All) | None => true,
    }
}

/// Registers a new subscriber with a sealed address. Re-registering an
/// existing address is idempotent and reactivates an inactive record.
pub fn register(
    db: &Database,
    sealer: &Sealer,
    email: &str,
    preferences: Preferences,
) -> Result<Subscriber> {
    if !email.validate_email() {
        return Err(ErrorKind::BadInput("invalid email address".to_string()).into());
    }

    if let Some(mut existing) = find_by_address(db, sealer, email)? {
        if existing.status == Status::Inactive {
            existing.status = Status::Active;
            db.set(&existing)?;
        }
        return Ok(existing);
    }

    let mut subscriber = Subscriber::new(sealer.seal(email)?);
    subscriber.preferences = preferences;
    db.set(&subscriber)?;
    Ok(subscriber)
}

/// Finds a subscriber by plaintext address, comparing against opened
/// sealed values. Rows sealed under a different key are skipped.
pub fn find_by_address(db: &Database, sealer: &Sealer, email: &str) -> Result<Option<Subscriber>> {
    for subscriber in db.get_collection::<Subscriber>()? {
        if sealer.open(&subscriber.address).as_deref() == Some(email) {
            return Ok(Some(subscriber));
        }
    }
    Ok(None)
}

pub fn set_preferences(db: &Database, id: Uuid, preferences: Preferences) -> Result<()> {
    let mut subscriber = db
        .get_opt::<Subscriber>(id)?
        .ok_or(ErrorKind::SubscriberNotFound(id))?;
    subscriber.preferences = preferences;
    db.set(&subscriber)?;
    Ok(())
}

/// Operator-facing projection of a subscriber. The address is masked; no
/// read path exposes the plaintext.
#[derive(Clone, Debug, Serialize)]
pub struct MaskedSubscriber {
    pub id: Uuid,
    pub email: String,
    pub status: Status,
    pub is_test: bool,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
}

pub fn masked(db: &Database, sealer: &Sealer) -> Result<Vec<MaskedSubscriber>> {
    let mut out: Vec<MaskedSubscriber> = db
        .get_collection::<Subscriber>()?
        .into_iter()
        .map(|s| MaskedSubscriber {
            id: s.id,
            email: match sealer.open(&s.address) {
                Some(address) => crypto::mask_email(&address),
                None => "(unreadable)".to_string(),
            },
            status: s.status,
            is_test: s.is_test,
            preferences: s.preferences,
            created_at: s.created_at,
        })
        .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}
