//! Tracking ingestion: open pixel hits, click redirects and web page
//! views.
//!
//! Every hit lands in the append-only event log; counters on the
//! dispatch audit record are incremented on top of it. Unique-open
//! dedup runs through a single atomic create-if-absent, so concurrent
//! opens from one recipient can never double-count. Counter updates
//! tolerate a missing audit record and turn into no-ops.

use uuid::Uuid;

use crate::analytics;
use crate::crypto;
use crate::db::{Collectable, Identifiable};
use crate::dispatch::MailDispatch;
use crate::time::Stamp;
use crate::{Config, Database, Result};

/// Collection holding one marker per (dispatch, recipient identity).
pub const UNIQUE_OPENS: &str = "unique_opens";

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    /// First pixel hit per (dispatch, identity).
    Open,
    /// Every pixel hit.
    EmailPv,
    Click,
    /// Web page view.
    #[default]
    Pv,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub kind: EventKind,

    pub mail_id: Option<Uuid>,
    pub target: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub referrer: Option<String>,

    pub ip: String,
    pub user_agent: String,

    pub at: Stamp,
}

impl TrackingEvent {
    pub fn new(kind: EventKind, client: &Client) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            mail_id: None,
            target: None,
            url: None,
            path: None,
            referrer: None,
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            at: Stamp::now(),
        }
    }
}

impl Default for TrackingEvent {
    fn default() -> Self {
        Self::new(EventKind::Pv, &Client::default())
    }
}

impl Collectable for TrackingEvent {
    fn get_collection_name() -> &'static str {
        "tracking_events"
    }
}

impl Identifiable for TrackingEvent {
    fn get_id(&self) -> Uuid {
        self.id
    }
}

/// Dedup marker, keyed by dispatch id + recipient identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UniqueOpenRecord {
    pub mail_id: Uuid,
    pub identity: String,
    pub first_seen: Stamp,
}

/// Remote client metadata attached to every event.
#[derive(Clone, Debug, Default)]
pub struct Client {
    pub ip: String,
    pub user_agent: String,
}

/// Ingests one open pixel hit. Returns whether this was the first open
/// for the (dispatch, identity) pair.
pub fn record_open(
    db: &Database,
    config: &Config,
    mail_id: Uuid,
    sid: Option<&str>,
    client: &Client,
) -> Result<bool> {
    let mut event = TrackingEvent::new(EventKind::EmailPv, client);
    event.mail_id = Some(mail_id);
    db.set(&event)?;
    db.update::<MailDispatch, _>(mail_id, |r| r.email_pv_count += 1)?;

    let identity = crypto::open_identity(sid, &client.ip, &client.user_agent);
    let marker = UniqueOpenRecord {
        mail_id,
        identity: identity.clone(),
        first_seen: Stamp::now(),
    };
    let first = db.create_if_absent_at(
        UNIQUE_OPENS,
        &unique_open_key(mail_id, &identity),
        &crate::db::encode(&marker)?,
    )?;

    if first {
        let mut event = TrackingEvent::new(EventKind::Open, client);
        event.mail_id = Some(mail_id);
        db.set(&event)?;
        db.update::<MailDispatch, _>(mail_id, |r| r.open_count += 1)?;

        analytics::forward(
            config,
            "email_open",
            serde_json::json!({ "mailId": mail_id, "identity": identity }),
        );
    }

    Ok(first)
}

/// Ingests one click. The click counter moves only when the click
/// references a dispatch; the event is logged either way.
pub fn record_click(
    db: &Database,
    config: &Config,
    mail_id: Option<Uuid>,
    target: Option<&str>,
    url: &str,
    client: &Client,
) -> Result<()> {
    let mut event = TrackingEvent::new(EventKind::Click, client);
    event.mail_id = mail_id;
    event.target = target.map(|t| t.to_string());
    event.url = Some(url.to_string());
    db.set(&event)?;

    if let Some(mail_id) = mail_id {
        db.update::<MailDispatch, _>(mail_id, |r| r.click_count += 1)?;
    }

    analytics::forward(
        config,
        "link_click",
        serde_json::json!({ "mailId": mail_id, "target": target, "url": url }),
    );

    Ok(())
}

/// Ingests one web page view reported by the public site.
pub fn record_page_view(
    db: &Database,
    config: &Config,
    path: Option<&str>,
    referrer: Option<&str>,
    client: &Client,
) -> Result<()> {
    let mut event = TrackingEvent::new(EventKind::Pv, client);
    event.path = path.map(|p| p.to_string());
    event.referrer = referrer.map(|r| r.to_string());
    db.set(&event)?;

    analytics::forward(
        config,
        "page_view",
        serde_json::json!({ "path": path, "referrer": referrer }),
    );

    Ok(())
}

fn unique_open_key(mail_id: Uuid, identity: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + identity.len());
    key.extend_from_slice(mail_id.as_bytes());
    key.extend_from_slice(identity.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RequestKind;

    fn client(ip: &str) -> Client {
        Client {
            ip: ip.to_string(),
            user_agent: "mail-client/1.0".to_string(),
        }
    }

    fn dispatch_record(db: &Database) -> Uuid {
        let record = MailDispatch::new(RequestKind::All);
        db.set(&record).unwrap();
        record.id
    }

    fn events_of(db: &Database, kind: EventKind) -> usize {
        db.get_collection::<TrackingEvent>()
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    #[test]
    fn repeat_opens_dedup_per_identity() {
        let db = Database::temporary().unwrap();
        let config = Config::default();
        let mail_id = dispatch_record(&db);

        assert!(record_open(&db, &config, mail_id, Some("tok1"), &client("1.1.1.1")).unwrap());
        assert!(!record_open(&db, &config, mail_id, Some("tok1"), &client("1.1.1.1")).unwrap());

        let record = db.get::<MailDispatch>(mail_id).unwrap();
        assert_eq!(record.open_count, 1);
        assert_eq!(record.email_pv_count, 2);
        assert_eq!(events_of(&db, EventKind::Open), 1);
        assert_eq!(events_of(&db, EventKind::EmailPv), 2);

        let markers: Vec<UniqueOpenRecord> = db.get_collection_at(UNIQUE_OPENS).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].mail_id, mail_id);
    }

    #[test]
    fn distinct_identities_count_separately() {
        let db = Database::temporary().unwrap();
        let config = Config::default();
        let mail_id = dispatch_record(&db);

        record_open(&db, &config, mail_id, Some("tok1"), &client("1.1.1.1")).unwrap();
        record_open(&db, &config, mail_id, Some("tok2"), &client("1.1.1.1")).unwrap();

        let record = db.get::<MailDispatch>(mail_id).unwrap();
        assert_eq!(record.open_count, 2);
    }

    #[test]
    fn identity_falls_back_to_client_hash() {
        let db = Database::temporary().unwrap();
        let config = Config::default();
        let mail_id = dispatch_record(&db);

        record_open(&db, &config, mail_id, None, &client("1.1.1.1")).unwrap();
        record_open(&db, &config, mail_id, None, &client("1.1.1.1")).unwrap();
        record_open(&db, &config, mail_id, None, &client("2.2.2.2")).unwrap();

        let record = db.get::<MailDispatch>(mail_id).unwrap();
        assert_eq!(record.open_count, 2);
        assert_eq!(record.email_pv_count, 3);
    }

    #[test]
    fn open_tolerates_a_missing_audit_record() {
        let db = Database::temporary().unwrap();
        let config = Config::default();

        let first = record_open(&db, &config, Uuid::new_v4(), Some("tok1"), &client("1.1.1.1"));
        assert!(first.unwrap());
        assert_eq!(events_of(&db, EventKind::EmailPv), 1);
        assert_eq!(db.len::<MailDispatch>().unwrap(), 0);
    }

    #[test]
    fn click_counter_requires_a_mail_reference() {
        let db = Database::temporary().unwrap();
        let config = Config::default();
        let mail_id = dispatch_record(&db);

        record_click(
            &db,
            &config,
            Some(mail_id),
            Some("top"),
            "https://example.com/a",
            &client("1.1.1.1"),
        )
        .unwrap();
        record_click(
            &db,
            &config,
            None,
            Some("web-home"),
            "https://example.com/b",
            &client("1.1.1.1"),
        )
        .unwrap();

        let record = db.get::<MailDispatch>(mail_id).unwrap();
        assert_eq!(record.click_count, 1);
        assert_eq!(events_of(&db, EventKind::Click), 2);
    }

    #[test]
    fn page_views_only_append_events() {
        let db = Database::temporary().unwrap();
        let config = Config::default();

        record_page_view(
            &db,
            &config,
            Some("/stories/42"),
            Some("https://news.example.com"),
            &client("1.1.1.1"),
        )
        .unwrap();

        assert_eq!(events_of(&db, EventKind::Pv), 1);
        let events = db.get_collection::<TrackingEvent>().unwrap();
        assert_eq!(events[0].path.as_deref(), Some("/stories/42"));
    }
}
