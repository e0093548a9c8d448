//! Date/time coercion for `Date` properties.
//!
//! The remote API is not consistent about date shapes: some endpoints send
//! RFC 3339 with an offset, some send offset-less local timestamps, some bare
//! dates, and a few send epoch milliseconds. A [`Timestamp`] keeps the exact
//! wire text it was read from and writes it back unchanged.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Wire {
    /// Parsed from a string; re-emitted verbatim.
    Text(Arc<str>),
    EpochMillis,
    /// Built locally; emitted as RFC 3339 with a `Z` suffix.
    Utc,
}

/// A point in time plus the wire form it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    at: DateTime<FixedOffset>,
    wire: Wire,
}

impl Timestamp {
    /// Wraps a UTC instant; it serializes as RFC 3339 with a `Z` suffix.
    pub fn from_utc(at: DateTime<Utc>) -> Self {
        Self {
            at: at.fixed_offset(),
            wire: Wire::Utc,
        }
    }

    /// Current time.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// Parses a date string in any of the accepted shapes.
    ///
    /// Offset-less date-times and bare dates are read as UTC.
    pub fn parse_str(s: &str) -> Option<Self> {
        let at = Self::instant(s.trim())?;
        Some(Self {
            at,
            wire: Wire::Text(Arc::from(s)),
        })
    }

    fn instant(s: &str) -> Option<DateTime<FixedOffset>> {
        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return Some(at);
        }
        if s.get(10..11) == Some(" ") {
            let spelled = format!("{}T{}", &s[..10], &s[11..]);
            if let Ok(at) = DateTime::parse_from_rfc3339(&spelled) {
                return Some(at);
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Some(naive.and_utc().fixed_offset());
            }
        }
        let date = NaiveDate::parse_from_str(s, DATE_FORMAT).ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset())
    }

    /// Coerces a wire value: strings are parsed, integers are epoch millis.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse_str(s),
            Value::Number(n) => {
                let millis = n.as_i64()?;
                let at = Utc.timestamp_millis_opt(millis).single()?;
                Some(Self {
                    at: at.fixed_offset(),
                    wire: Wire::EpochMillis,
                })
            }
            _ => None,
        }
    }

    /// The instant, with its original offset.
    pub fn datetime(&self) -> DateTime<FixedOffset> {
        self.at
    }

    /// The instant in UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.at.with_timezone(&Utc)
    }

    /// Wire representation, identical to the value this was parsed from.
    pub fn to_value(&self) -> Value {
        match &self.wire {
            Wire::Text(text) => Value::String(text.to_string()),
            Wire::EpochMillis => Value::from(self.at.timestamp_millis()),
            Wire::Utc => Value::String(self.at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}
