//! Timestamp handling for records that survived two serialization eras.
//!
//! Audit and tracking records carry either a proper UTC instant or an
//! offset-naive datetime that was written out already shifted into the
//! reporting zone. Day-bucketing has to apply the zone shift exactly once,
//! so the two representations are kept distinct instead of being collapsed
//! at parse time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::de;

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stamp {
    /// Instant with an explicit utc marker (or offset) in its wire form.
    Utc(DateTime<Utc>),
    /// Offset-naive datetime, taken to be already expressed in the
    /// reporting zone.
    Local(NaiveDateTime),
}

impl Stamp {
    pub fn now() -> Self {
        Self::Utc(Utc::now())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::Utc(dt.with_timezone(&Utc)));
        }
        for fmt in LOCAL_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self::Local(naive));
            }
        }
        Err(format!("unrecognized timestamp: {s}"))
    }

    /// Calendar day of this stamp in the given zone. The shift is applied
    /// for utc-marked instants only; naive values are already shifted.
    pub fn day_in(&self, tz: Tz) -> NaiveDate {
        match self {
            Self::Utc(dt) => dt.with_timezone(&tz).date_naive(),
            Self::Local(naive) => naive.date(),
        }
    }

    /// Millisecond key usable for ordering stamps of both representations.
    pub fn sort_key(&self, tz: Tz) -> i64 {
        match self {
            Self::Utc(dt) => dt.timestamp_millis(),
            Self::Local(naive) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.timestamp_millis())
                .unwrap_or_else(|| naive.and_utc().timestamp_millis()),
        }
    }
}

impl serde::Serialize for Stamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Utc(dt) => {
                serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Self::Local(naive) => {
                serializer.serialize_str(&naive.format(LOCAL_FORMATS[0]).to_string())
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for Stamp {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Seoul;

    #[test]
    fn one_instant_one_bucket() {
        // 16:30 utc on the 14th is 01:30 on the 15th in Seoul. A record of
        // the same instant stored naively was written out already shifted.
        let aware = Stamp::Utc(Utc.with_ymd_and_hms(2024, 1, 14, 16, 30, 0).unwrap());
        let naive = Stamp::parse("2024-01-15T01:30:00").unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(aware.day_in(Seoul), expected);
        assert_eq!(naive.day_in(Seoul), expected);
    }

    #[test]
    fn bucket_boundary() {
        let before = Stamp::Utc(Utc.with_ymd_and_hms(2024, 1, 14, 14, 59, 59).unwrap());
        let after = Stamp::Utc(Utc.with_ymd_and_hms(2024, 1, 14, 15, 0, 0).unwrap());
        assert_eq!(
            before.day_in(Seoul),
            NaiveDate::from_ymd_opt(2024, 1, 14).unwrap()
        );
        assert_eq!(
            after.day_in(Seoul),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn parse_keeps_representation() {
        assert!(matches!(
            Stamp::parse("2024-01-15T01:30:00Z").unwrap(),
            Stamp::Utc(_)
        ));
        assert!(matches!(
            Stamp::parse("2024-01-15T10:30:00+09:00").unwrap(),
            Stamp::Utc(_)
        ));
        assert!(matches!(
            Stamp::parse("2024-01-15T01:30:00").unwrap(),
            Stamp::Local(_)
        ));
        assert!(Stamp::parse("yesterday-ish").is_err());
    }

    #[test]
    fn offset_marked_input_shifts_once() {
        // +09:00 input normalizes to utc, then day_in shifts it back. Still
        // a single logical shift overall.
        let stamp = Stamp::parse("2024-01-15T01:30:00+09:00").unwrap();
        assert_eq!(
            stamp.day_in(Seoul),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn serde_roundtrip() {
        let aware = Stamp::Utc(Utc.with_ymd_and_hms(2024, 1, 14, 16, 30, 0).unwrap());
        let json = serde_json::to_string(&aware).unwrap();
        assert_eq!(serde_json::from_str::<Stamp>(&json).unwrap(), aware);

        let naive = Stamp::parse("2024-01-15T01:30:00").unwrap();
        let json = serde_json::to_string(&naive).unwrap();
        assert_eq!(serde_json::from_str::<Stamp>(&json).unwrap(), naive);
    }

    #[test]
    fn sort_key_orders_across_representations() {
        let earlier = Stamp::Utc(Utc.with_ymd_and_hms(2024, 1, 14, 16, 0, 0).unwrap());
        // 01:30 Seoul on the 15th is 16:30 utc on the 14th.
        let later = Stamp::parse("2024-01-15T01:30:00").unwrap();
        assert!(earlier.sort_key(Seoul) < later.sort_key(Seoul));
    }
}
