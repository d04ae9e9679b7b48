use chrono::{DateTime, Duration as ChronoDuration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Absolute time range in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Resolve raw `from`/`to` strings against `now`.
    ///
    /// Accepts `now`, relative offsets such as `now-6h` or `now+1d`, Unix
    /// epoch milliseconds and RFC 3339 timestamps. A bound that cannot be
    /// parsed resolves to the Unix epoch.
    pub fn parse(from: &str, to: &str, now: DateTime<Utc>) -> Self {
        Self {
            from: parse_bound(from, now),
            to: parse_bound(to, now),
        }
    }

    pub fn duration(&self) -> ChronoDuration {
        self.to - self.from
    }
}

fn parse_bound(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    match parse_time(raw.trim(), now) {
        Some(instant) => instant,
        None => {
            warn!(value = raw, "unparsable time range bound, falling back to epoch");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

/// Parse one time expression, `None` when it is not understood
pub fn parse_time(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if raw == "now" {
        return Some(now);
    }

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = raw.parse().ok()?;
        return Utc.timestamp_millis_opt(millis).single();
    }

    if let Some(offset) = raw.strip_prefix("now") {
        return apply_offset(offset, now);
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn apply_offset(offset: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (negative, rest) = match offset.as_bytes().first()? {
        b'-' => (true, &offset[1..]),
        b'+' => (false, &offset[1..]),
        _ => return None,
    };

    let split = rest.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = rest.split_at(split);
    let amount: i64 = amount.parse().ok()?;

    let calendar = |months: u32| -> Option<DateTime<Utc>> {
        let months = Months::new(months);
        if negative {
            now.checked_sub_months(months)
        } else {
            now.checked_add_months(months)
        }
    };

    let delta = match unit {
        "ms" => ChronoDuration::try_milliseconds(amount)?,
        "s" => ChronoDuration::try_seconds(amount)?,
        "m" => ChronoDuration::try_minutes(amount)?,
        "h" => ChronoDuration::try_hours(amount)?,
        "d" => ChronoDuration::try_days(amount)?,
        "w" => ChronoDuration::try_weeks(amount)?,
        "M" => return calendar(u32::try_from(amount).ok()?),
        "y" => return calendar(u32::try_from(amount).ok()?.checked_mul(12)?),
        _ => return None,
    };

    if negative {
        now.checked_sub_signed(delta)
    } else {
        now.checked_add_signed(delta)
    }
}
