//! Read-only aggregation over the dispatch audit trail and the raw
//! event log.
//!
//! Everything buckets by calendar day in the configured reporting zone.
//! The shift is applied exactly once per timestamp regardless of how it
//! was serialized; [`Stamp`] carries that distinction.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::dispatch::{DispatchStatus, MailDispatch, RequestKind};
use crate::time::Stamp;
use crate::track::{EventKind, TrackingEvent};
use crate::{Config, Database, Result};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub history: Vec<HistoryEntry>,
    pub chart_data: Vec<DayVolume>,
    pub web_stats: Vec<DayWebStats>,
    pub summary: Summary,
    pub quota: Quota,
}

/// One audit record as shown in the operator history listing, with its
/// engagement rates attached where the record qualifies.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub created_at: Stamp,
    pub request_type: RequestKind,
    pub recipient_count: u64,
    pub status: DispatchStatus,
    pub simulated: bool,
    pub open_count: u64,
    pub email_pv_count: u64,
    pub click_count: u64,
    pub delivered_count: Option<u64>,
    pub error_message: Option<String>,
    /// Percent, one decimal. None when the record is excluded from rate
    /// calculations.
    pub open_rate: Option<f64>,
    pub click_rate: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayVolume {
    pub day: NaiveDate,
    pub sent: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayWebStats {
    pub day: NaiveDate,
    pub page_views: u64,
    pub clicks: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub dispatch_count: u64,
    pub total_sent: u64,
    pub average_open_rate: Option<f64>,
    pub average_click_rate: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub today_count: u64,
    pub limit: u64,
    pub sender: String,
}

/// Builds the full operator overview from the store.
pub fn overview(db: &Database, config: &Config) -> Result<Overview> {
    let records = db.get_collection::<MailDispatch>()?;
    let events = db.get_collection::<TrackingEvent>()?;
    let today = Utc::now()
        .with_timezone(&config.metrics.timezone)
        .date_naive();
    Ok(aggregate(&records, &events, config, today))
}

/// Pure aggregation over loaded records. `today` anchors the chart and
/// quota ranges.
pub fn aggregate(
    records: &[MailDispatch],
    events: &[TrackingEvent],
    config: &Config,
    today: NaiveDate,
) -> Overview {
    let tz = config.metrics.timezone;

    let mut sorted: Vec<&MailDispatch> = records.iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(r.created_at.sort_key(tz)));
    let history = sorted
        .iter()
        .take(config.metrics.history_limit)
        .map(|r| entry(r))
        .collect();

    let chart_data = volume_by_day(records, tz, today, config.metrics.chart_days);
    let web_stats = web_by_day(events, tz, today, config.metrics.web_days);

    let mut open_rates = Vec::new();
    let mut click_rates = Vec::new();
    for record in records.iter().filter(|r| rated(r)) {
        open_rates.push(rate(record.open_count, record.recipient_count));
        click_rates.push(rate(record.click_count, record.recipient_count));
    }
    let summary = Summary {
        dispatch_count: records.len() as u64,
        total_sent: records
            .iter()
            .filter(|r| counts_toward_volume(r))
            .map(|r| r.recipient_count)
            .sum(),
        average_open_rate: mean(&open_rates),
        average_click_rate: mean(&click_rates),
    };

    let today_count = records
        .iter()
        .filter(|r| counts_toward_volume(r) && r.created_at.day_in(tz) == today)
        .map(|r| r.recipient_count)
        .sum();
    // Sender shown on the dashboard; a mode label when smtp is unconfigured.
    let sender = if !config.smtp.sender.is_empty() {
        config.smtp.sender.clone()
    } else if !config.smtp.user.is_empty() {
        config.smtp.user.clone()
    } else {
        "simulated".to_string()
    };
    let quota = Quota {
        today_count,
        limit: config.dispatch.daily_limit,
        sender,
    };

    Overview {
        history,
        chart_data,
        web_stats,
        summary,
        quota,
    }
}

/// Successful real sends. Simulated and error records never contribute
/// to volume or quota.
fn counts_toward_volume(record: &MailDispatch) -> bool {
    record.status == DispatchStatus::Success && !record.simulated
}

/// Records eligible for rate calculations. Excluded records contribute
/// nothing, they are not counted as zero.
fn rated(record: &MailDispatch) -> bool {
    counts_toward_volume(record) && record.recipient_count > 0
}

fn entry(record: &MailDispatch) -> HistoryEntry {
    let (open_rate, click_rate) = if rated(record) {
        (
            Some(rate(record.open_count, record.recipient_count)),
            Some(rate(record.click_count, record.recipient_count)),
        )
    } else {
        (None, None)
    };
    HistoryEntry {
        id: record.id,
        created_at: record.created_at,
        request_type: record.request_type,
        recipient_count: record.recipient_count,
        status: record.status,
        simulated: record.simulated,
        open_count: record.open_count,
        email_pv_count: record.email_pv_count,
        click_count: record.click_count,
        delivered_count: record.delivered_count,
        error_message: record.error_message.clone(),
        open_rate,
        click_rate,
    }
}

fn rate(count: u64, total: u64) -> f64 {
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

fn mean(rates: &[f64]) -> Option<f64> {
    if rates.is_empty() {
        return None;
    }
    Some((rates.iter().sum::<f64>() / rates.len() as f64 * 10.0).round() / 10.0)
}

/// Dense per-day send volume for the `days` ending at `today`. Days
/// without sends are present with zero.
fn volume_by_day(records: &[MailDispatch], tz: Tz, today: NaiveDate, days: i64) -> Vec<DayVolume> {
    let start = today - Duration::days(days - 1);
    let mut by_day: HashMap<NaiveDate, u64> = HashMap::new();
    for record in records.iter().filter(|r| counts_toward_volume(r)) {
        let day = record.created_at.day_in(tz);
        if day >= start && day <= today {
            *by_day.entry(day).or_insert(0) += record.recipient_count;
        }
    }
    (0..days)
        .map(|offset| {
            let day = start + Duration::days(offset);
            DayVolume {
                day,
                sent: by_day.get(&day).copied().unwrap_or(0),
            }
        })
        .collect()
}

fn web_by_day(events: &[TrackingEvent], tz: Tz, today: NaiveDate, days: i64) -> Vec<DayWebStats> {
    let start = today - Duration::days(days - 1);
    let mut views: HashMap<NaiveDate, u64> = HashMap::new();
    let mut clicks: HashMap<NaiveDate, u64> = HashMap::new();
    for event in events {
        let day = event.at.day_in(tz);
        if day < start || day > today {
            continue;
        }
        match event.kind {
            EventKind::Pv => *views.entry(day).or_insert(0) += 1,
            EventKind::Click if is_web_click(event) => *clicks.entry(day).or_insert(0) += 1,
            _ => {}
        }
    }
    (0..days)
        .map(|offset| {
            let day = start + Duration::days(offset);
            DayWebStats {
                day,
                page_views: views.get(&day).copied().unwrap_or(0),
                clicks: clicks.get(&day).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// A click belongs to the web side when it references no dispatch or its
/// target label marks a web origin.
fn is_web_click(event: &TrackingEvent) -> bool {
    event.mail_id.is_none()
        || event
            .target
            .as_deref()
            .map(|t| t.starts_with("web"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Client;

    fn record(recipients: u64, opens: u64, clicks: u64) -> MailDispatch {
        let mut record = MailDispatch::new(RequestKind::All);
        record.recipient_count = recipients;
        record.open_count = opens;
        record.click_count = clicks;
        record
    }

    fn config() -> Config {
        Config::default()
    }

    fn today(config: &Config) -> NaiveDate {
        Utc::now()
            .with_timezone(&config.metrics.timezone)
            .date_naive()
    }

    #[test]
    fn rates_round_to_one_decimal() {
        let config = config();
        let records = vec![record(3, 1, 1)];
        let overview = aggregate(&records, &[], &config, today(&config));
        assert_eq!(overview.history[0].open_rate, Some(33.3));
        assert_eq!(overview.history[0].click_rate, Some(33.3));
    }

    #[test]
    fn guarded_records_are_excluded_not_zeroed() {
        let config = config();
        let mut simulated = record(10, 5, 0);
        simulated.simulated = true;
        let mut failed = record(0, 0, 0);
        failed.status = DispatchStatus::Error;
        let real = record(10, 5, 0);

        let records = vec![simulated, failed, real];
        let overview = aggregate(&records, &[], &config, today(&config));

        // Only the real record carries rates or feeds the average.
        let rated: Vec<&HistoryEntry> = overview
            .history
            .iter()
            .filter(|e| e.open_rate.is_some())
            .collect();
        assert_eq!(rated.len(), 1);
        assert_eq!(overview.summary.average_open_rate, Some(50.0));
        assert_eq!(overview.summary.total_sent, 10);
    }

    #[test]
    fn no_rated_records_means_no_average() {
        let config = config();
        let mut simulated = record(10, 5, 0);
        simulated.simulated = true;
        let overview = aggregate(&[simulated], &[], &config, today(&config));
        assert_eq!(overview.summary.average_open_rate, None);
    }

    #[test]
    fn quota_sender_prefers_configured_identity() {
        let mut config = config();
        let today = today(&config);

        let overview = aggregate(&[], &[], &config, today);
        assert_eq!(overview.quota.sender, "simulated");

        config.smtp.user = "mailer@example.com".to_string();
        let overview = aggregate(&[], &[], &config, today);
        assert_eq!(overview.quota.sender, "mailer@example.com");

        config.smtp.sender = "brief@example.com".to_string();
        let overview = aggregate(&[], &[], &config, today);
        assert_eq!(overview.quota.sender, "brief@example.com");
    }

    #[test]
    fn quota_counts_todays_real_sends_only() {
        let config = config();
        let today = today(&config);

        let mut old = record(100, 0, 0);
        old.created_at = Stamp::Utc(Utc::now() - Duration::days(3));
        let mut simulated = record(50, 0, 0);
        simulated.simulated = true;
        let fresh = record(120, 0, 0);

        let overview = aggregate(&[old, simulated, fresh], &[], &config, today);
        assert_eq!(overview.quota.today_count, 120);
        assert_eq!(overview.quota.limit, 500);
    }

    #[test]
    fn chart_range_is_dense() {
        let config = config();
        let today = today(&config);
        let overview = aggregate(&[record(5, 0, 0)], &[], &config, today);

        assert_eq!(overview.chart_data.len(), 7);
        assert_eq!(overview.chart_data[0].day, today - Duration::days(6));
        assert_eq!(overview.chart_data[6].day, today);
        assert_eq!(overview.chart_data[6].sent, 5);
        assert!(overview.chart_data[..6].iter().all(|d| d.sent == 0));
        assert_eq!(overview.web_stats.len(), 30);
    }

    #[test]
    fn history_is_most_recent_first_and_limited() {
        let mut config = config();
        config.metrics.history_limit = 2;
        let today = today(&config);

        let mut first = record(1, 0, 0);
        first.created_at = Stamp::Utc(Utc::now() - Duration::days(2));
        let mut second = record(2, 0, 0);
        second.created_at = Stamp::Utc(Utc::now() - Duration::days(1));
        let third = record(3, 0, 0);

        let overview = aggregate(&[first, second, third.clone()], &[], &config, today);
        assert_eq!(overview.history.len(), 2);
        assert_eq!(overview.history[0].id, third.id);
    }

    #[test]
    fn mixed_timestamp_representations_bucket_together() {
        let config = config();
        let tz = config.metrics.timezone;
        let now = Utc::now();
        let today = now.with_timezone(&tz).date_naive();

        let mut marked = record(10, 0, 0);
        marked.created_at = Stamp::Utc(now);
        let mut shifted = record(20, 0, 0);
        shifted.created_at = Stamp::Local(now.with_timezone(&tz).naive_local());

        let overview = aggregate(&[marked, shifted], &[], &config, today);
        assert_eq!(overview.quota.today_count, 30);
    }

    #[test]
    fn web_clicks_split_from_email_clicks() {
        let config = config();
        let client = Client::default();

        let mut email_click = TrackingEvent::new(EventKind::Click, &client);
        email_click.mail_id = Some(Uuid::new_v4());
        email_click.target = Some("top".to_string());

        let mut site_click = TrackingEvent::new(EventKind::Click, &client);
        site_click.target = Some("web-home".to_string());

        let mut marked_web = TrackingEvent::new(EventKind::Click, &client);
        marked_web.mail_id = Some(Uuid::new_v4());
        marked_web.target = Some("web-banner".to_string());

        let view = TrackingEvent::new(EventKind::Pv, &client);

        let events = vec![email_click, site_click, marked_web, view];
        let overview = aggregate(&[], &events, &config, today(&config));

        let today_stats = overview.web_stats.last().unwrap();
        assert_eq!(today_stats.clicks, 2);
        assert_eq!(today_stats.page_views, 1);
    }
}
