//! Dispatch execution: resolve recipients, compose and render digests,
//! fan out deliveries and write the audit record.
//!
//! The audit record is written before the first message leaves, so
//! engagement pixels firing right after delivery always find a record to
//! increment. Delivery results are then folded back in with an atomic
//! update, never a plain overwrite.

use futures::StreamExt;
use uuid::Uuid;

use crate::content::{self, ContentItem};
use crate::crypto::Sealer;
use crate::db::{Collectable, Identifiable};
use crate::digest;
use crate::email;
use crate::render;
use crate::subscriber::{self, Recipient};
use crate::time::Stamp;
use crate::{Config, Database, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispatchMode {
    All,
    Individual,
    Group,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetGroup {
    All,
    Test,
    Production,
}

/// What a stored audit record describes. `Error` records mark dispatch
/// attempts that failed before any delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestKind {
    #[default]
    All,
    Individual,
    Group,
    Error,
}

impl From<DispatchMode> for RequestKind {
    fn from(mode: DispatchMode) -> Self {
        match mode {
            DispatchMode::All => RequestKind::All,
            DispatchMode::Individual => RequestKind::Individual,
            DispatchMode::Group => RequestKind::Group,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispatchStatus {
    #[default]
    Success,
    Error,
}

/// Audit record for one dispatch. Doubles as the accumulator for the
/// engagement counters that tracking ingestion increments.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MailDispatch {
    pub id: Uuid,
    pub created_at: Stamp,

    pub request_type: RequestKind,
    /// Recipients the executor attempted, resolved before fan-out.
    pub recipient_count: u64,
    pub status: DispatchStatus,
    /// True when smtp was unconfigured and nothing reached a transport.
    pub simulated: bool,

    pub open_count: u64,
    pub email_pv_count: u64,
    pub click_count: u64,

    /// Deliveries that actually went through. Absent on error records.
    pub delivered_count: Option<u64>,
    pub error_message: Option<String>,
}

impl MailDispatch {
    pub fn new(request_type: RequestKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Stamp::now(),
            request_type,
            recipient_count: 0,
            status: DispatchStatus::Success,
            simulated: false,
            open_count: 0,
            email_pv_count: 0,
            click_count: 0,
            delivered_count: Some(0),
            error_message: None,
        }
    }
}

impl Default for MailDispatch {
    fn default() -> Self {
        Self::new(RequestKind::All)
    }
}

impl Collectable for MailDispatch {
    fn get_collection_name() -> &'static str {
        "mail_history"
    }
}

impl Identifiable for MailDispatch {
    fn get_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub mode: DispatchMode,
    #[serde(default)]
    pub subscriber_id: Option<Uuid>,
    #[serde(default)]
    pub target_group: Option<TargetGroup>,
}

impl DispatchRequest {
    pub fn all() -> Self {
        Self {
            mode: DispatchMode::All,
            subscriber_id: None,
            target_group: None,
        }
    }

    pub fn individual(id: Uuid) -> Self {
        Self {
            mode: DispatchMode::Individual,
            subscriber_id: Some(id),
            target_group: None,
        }
    }

    pub fn group(group: TargetGroup) -> Self {
        Self {
            mode: DispatchMode::Group,
            subscriber_id: None,
            target_group: Some(group),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DispatchOutcome {
    Sent {
        count: u64,
        simulated: bool,
        mail_id: Uuid,
    },
    NoRecipients,
}

/// Runs one dispatch end to end.
///
/// Resolution failures surface directly to the caller without touching
/// the audit trail. Anything failing past resolution writes an error
/// record before the error propagates.
pub async fn execute(
    db: &Database,
    config: &Config,
    request: &DispatchRequest,
) -> Result<DispatchOutcome> {
    let sealer = Sealer::from_config(&config.crypto);
    let recipients = subscriber::resolve(db, &sealer, request)?;
    if recipients.is_empty() {
        tracing::info!(mode = %request.mode, "dispatch resolved zero recipients");
        return Ok(DispatchOutcome::NoRecipients);
    }

    match dispatch_to(db, config, &sealer, request, recipients).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            record_failure(db, &e);
            Err(e)
        }
    }
}

async fn dispatch_to(
    db: &Database,
    config: &Config,
    sealer: &Sealer,
    request: &DispatchRequest,
    recipients: Vec<Recipient>,
) -> Result<DispatchOutcome> {
    let pool = content::eligible_pool(
        db,
        config.dispatch.content_window_hours,
        config.dispatch.pool_size,
    )?;

    let simulated = !config.smtp.is_configured();
    let mailer = if simulated {
        None
    } else {
        Some(email::transport(&config.smtp)?)
    };

    let mut record = MailDispatch::new(request.mode.into());
    record.recipient_count = recipients.len() as u64;
    record.simulated = simulated;
    db.set(&record)?;

    tracing::info!(
        mail = %record.id,
        recipients = record.recipient_count,
        simulated,
        "dispatch started"
    );

    let deliveries: Vec<bool> = futures::stream::iter(recipients)
        .map(|recipient| deliver_one(config, sealer, &pool, mailer.as_ref(), record.id, recipient))
        .buffer_unordered(config.dispatch.concurrency.max(1))
        .collect()
        .await;
    let delivered = deliveries.iter().filter(|ok| **ok).count() as u64;

    // Folded in atomically; open counters may already be moving.
    db.update::<MailDispatch, _>(record.id, |r| {
        r.delivered_count = Some(delivered);
    })?;

    tracing::info!(mail = %record.id, delivered, "dispatch finished");

    Ok(DispatchOutcome::Sent {
        count: record.recipient_count,
        simulated,
        mail_id: record.id,
    })
}

/// Renders and delivers one recipient's copy. Failures are logged and
/// reported as `false`; they never abort the rest of the fan-out.
async fn deliver_one(
    config: &Config,
    sealer: &Sealer,
    pool: &[ContentItem],
    mailer: Option<&email::Mailer>,
    mail_id: Uuid,
    recipient: Recipient,
) -> bool {
    let digest = digest::personalize(
        pool,
        &recipient.preferences,
        &config.dispatch.categories,
        config.dispatch.top_stories,
        config.dispatch.category_cap,
    );
    let sid = sealer.recipient_token(&recipient.address);

    let rendered = match render::render(config, &digest, mail_id, &sid) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::error!(recipient = %recipient.id, "render failed: {}", e.kind);
            return false;
        }
    };

    match mailer {
        Some(mailer) => {
            let message = match email::build_message(config, &recipient.address, &rendered) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(recipient = %recipient.id, "message build failed: {}", e.kind);
                    return false;
                }
            };
            match email::send(mailer, message).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(recipient = %recipient.id, "delivery failed: {}", e.kind);
                    false
                }
            }
        }
        None => {
            tracing::debug!(
                recipient = %recipient.id,
                subject = %rendered.subject,
                "simulated delivery"
            );
            true
        }
    }
}

/// Writes an error record into the audit trail. Best effort.
pub fn record_failure(db: &Database, error: &Error) {
    let mut record = MailDispatch::new(RequestKind::Error);
    record.status = DispatchStatus::Error;
    record.delivered_count = None;
    record.error_message = Some(error.kind.to_string());
    if let Err(e) = db.set(&record) {
        tracing::error!("failed to write error audit record: {}", e.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::subscriber::Preferences;

    fn config() -> Config {
        Config {
            crypto: crate::config::Crypto {
                key: "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
                    .to_string(),
            },
            ..Config::default()
        }
    }

    fn seed_subscriber(db: &Database, config: &Config, email: &str) -> Uuid {
        let sealer = Sealer::from_config(&config.crypto);
        subscriber::register(db, &sealer, email, Preferences::default())
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn simulated_dispatch_writes_the_audit_record() {
        let db = Database::temporary().unwrap();
        let config = config();
        seed_subscriber(&db, &config, "one@example.com");
        seed_subscriber(&db, &config, "two@example.com");

        let outcome = execute(&db, &config, &DispatchRequest::all()).await.unwrap();
        let mail_id = match outcome {
            DispatchOutcome::Sent {
                count,
                simulated,
                mail_id,
            } => {
                assert_eq!(count, 2);
                assert!(simulated);
                mail_id
            }
            other => panic!("unexpected outcome: {other:?}"),
        };

        let record = db.get::<MailDispatch>(mail_id).unwrap();
        assert_eq!(record.recipient_count, 2);
        assert_eq!(record.delivered_count, Some(2));
        assert_eq!(record.status, DispatchStatus::Success);
        assert_eq!(record.request_type, RequestKind::All);
        assert!(record.simulated);
        assert_eq!(record.open_count, 0);
    }

    #[tokio::test]
    async fn individual_dispatch_reaches_one_recipient() {
        let db = Database::temporary().unwrap();
        let config = config();
        let target = seed_subscriber(&db, &config, "one@example.com");
        seed_subscriber(&db, &config, "two@example.com");

        let outcome = execute(&db, &config, &DispatchRequest::individual(target))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Sent { count: 1, .. }));
    }

    #[tokio::test]
    async fn empty_store_short_circuits_without_a_record() {
        let db = Database::temporary().unwrap();
        let config = config();

        let outcome = execute(&db, &config, &DispatchRequest::all()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::NoRecipients);
        assert_eq!(db.len::<MailDispatch>().unwrap(), 0);
    }

    #[tokio::test]
    async fn resolver_failure_leaves_no_error_record() {
        let db = Database::temporary().unwrap();
        let config = config();

        let result = execute(&db, &config, &DispatchRequest::individual(Uuid::new_v4())).await;
        assert!(matches!(
            result.map_err(|e| e.kind),
            Err(ErrorKind::SubscriberNotFound(_))
        ));
        assert_eq!(db.len::<MailDispatch>().unwrap(), 0);
    }

    #[test]
    fn failure_records_carry_the_error_shape() {
        let db = Database::temporary().unwrap();
        record_failure(&db, &ErrorKind::Other("relay refused".to_string()).into());

        let records = db.get_collection::<MailDispatch>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_type, RequestKind::Error);
        assert_eq!(records[0].status, DispatchStatus::Error);
        assert_eq!(records[0].recipient_count, 0);
        assert_eq!(records[0].delivered_count, None);
        assert_eq!(
            records[0].error_message.as_deref(),
            Some("other error: relay refused")
        );
    }
}
