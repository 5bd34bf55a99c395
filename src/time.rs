//! Server time decoding
//!
//! Route server daemons report timestamps in their local time zone using a
//! handful of layouts (full, short and extended). The layouts are chrono
//! `strftime` strings configured per source; the zone is an IANA name.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_humanize::HumanTime;
use chrono_tz::Tz;
use std::time::Duration;

pub const DEFAULT_SERVER_TIME: &str = "%Y-%m-%dT%H:%M:%S%:z";
pub const DEFAULT_SERVER_TIME_SHORT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_SERVER_TIME_EXT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Time zone and layouts used to decode one source's timestamps
#[derive(Debug, Clone)]
pub struct ServerTimeSettings {
    pub timezone: Tz,
    /// Layout of absolute timestamps (TTL, cache headers)
    pub server_time: String,
    /// Layout of state-change and route age timestamps
    pub server_time_short: String,
    /// Layout of the last reconfiguration timestamp
    pub server_time_ext: String,
}

impl Default for ServerTimeSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            server_time: DEFAULT_SERVER_TIME.to_string(),
            server_time_short: DEFAULT_SERVER_TIME_SHORT.to_string(),
            server_time_ext: DEFAULT_SERVER_TIME_EXT.to_string(),
        }
    }
}

impl ServerTimeSettings {
    pub fn new(timezone: &str) -> Result<Self> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown time zone '{}': {}", timezone, e))?;
        Ok(Self {
            timezone,
            ..Default::default()
        })
    }

    /// Decode an absolute timestamp in the full layout
    pub fn parse(&self, value: &str) -> Result<DateTime<Utc>> {
        parse_server_time(value, &self.server_time, &self.timezone)
    }

    /// Decode an absolute timestamp in the short layout
    pub fn parse_short(&self, value: &str) -> Result<DateTime<Utc>> {
        parse_server_time(value, &self.server_time_short, &self.timezone)
    }

    /// Decode an absolute timestamp in the extended layout
    pub fn parse_ext(&self, value: &str) -> Result<DateTime<Utc>> {
        parse_server_time(value, &self.server_time_ext, &self.timezone)
    }

    /// Decode a TTL header: RFC 3339 first, then the full layout.
    ///
    /// A missing TTL means the answer must not be cached.
    pub fn parse_ttl(&self, value: Option<&str>) -> Result<DateTime<Utc>> {
        match value {
            None => Ok(Utc::now()),
            Some(v) if v.is_empty() => Ok(Utc::now()),
            Some(v) => match DateTime::parse_from_rfc3339(v) {
                Ok(t) => Ok(t.with_timezone(&Utc)),
                Err(_) => self.parse(v),
            },
        }
    }

    /// Time elapsed since a short-layout timestamp.
    ///
    /// Unparseable or missing values yield a zero duration.
    pub fn parse_relative(&self, value: Option<&str>) -> Duration {
        match value.map(|v| self.parse_short(v)) {
            Some(Ok(t)) => since(t),
            Some(Err(e)) => {
                tracing::debug!("Ignoring unparseable server time: {}", e);
                Duration::ZERO
            }
            None => Duration::ZERO,
        }
    }
}

/// Convert a server time string into UTC.
///
/// Layouts carrying an offset (`%z`, `%:z`) are honoured as is; naive layouts
/// are interpreted in `timezone`. Date-only layouts resolve to local midnight.
pub fn parse_server_time(value: &str, layout: &str, timezone: &Tz) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_str(value, layout) {
        return Ok(t.with_timezone(&Utc));
    }

    let naive = match NaiveDateTime::parse_from_str(value, layout) {
        Ok(n) => n,
        Err(e) => match NaiveDate::parse_from_str(value, layout) {
            Ok(d) => d.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("Invalid date"))?,
            Err(_) => {
                return Err(anyhow!(
                    "Unable to parse server time '{}' with layout '{}': {}",
                    value,
                    layout,
                    e
                ))
            }
        },
    };

    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Server time '{}' does not exist in {}", value, timezone))
}

/// Wall clock time elapsed since `t`, zero for timestamps in the future
pub fn since(t: DateTime<Utc>) -> Duration {
    (Utc::now() - t).to_std().unwrap_or(Duration::ZERO)
}

/// Human readable relative time, e.g. "5 minutes ago"
pub fn humanize(t: DateTime<Utc>) -> String {
    HumanTime::from(t - Utc::now()).to_string()
}

/// Serialize durations as fractional seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_time_in_zone() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // CET is UTC+1 in January
        let t = parse_server_time("2018-01-30 12:05:10", DEFAULT_SERVER_TIME_SHORT, &tz).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2018, 1, 30, 11, 5, 10).unwrap());

        // CEST is UTC+2 in July
        let t = parse_server_time("2018-07-30 12:05:10", DEFAULT_SERVER_TIME_SHORT, &tz).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2018, 7, 30, 10, 5, 10).unwrap());
    }

    #[test]
    fn test_parse_server_time_with_offset_layout() {
        let t = parse_server_time("2018-01-30T12:05:10+02:00", DEFAULT_SERVER_TIME, &Tz::UTC)
            .unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2018, 1, 30, 10, 5, 10).unwrap());

        let t = parse_server_time(
            "Tue, 30 Jan 2018 12:05:10 +0100",
            DEFAULT_SERVER_TIME_EXT,
            &Tz::UTC,
        )
        .unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2018, 1, 30, 11, 5, 10).unwrap());
    }

    #[test]
    fn test_parse_server_time_date_only() {
        let t = parse_server_time("2018-01-30", "%Y-%m-%d", &Tz::UTC).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2018, 1, 30, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_server_time_invalid() {
        assert!(parse_server_time("yesterday", DEFAULT_SERVER_TIME_SHORT, &Tz::UTC).is_err());
        assert!(parse_server_time("", DEFAULT_SERVER_TIME_SHORT, &Tz::UTC).is_err());
    }

    #[test]
    fn test_parse_ttl() {
        let settings = ServerTimeSettings::default();
        let t = settings.parse_ttl(Some("2030-01-01T00:05:00Z")).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2030, 1, 1, 0, 5, 0).unwrap());

        let t = settings.parse_ttl(Some("2030-01-01T00:05:00+01:00")).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2029, 12, 31, 23, 5, 0).unwrap());

        let before = Utc::now();
        let t = settings.parse_ttl(None).unwrap();
        assert!(t >= before);

        assert!(settings.parse_ttl(Some("garbage")).is_err());
    }

    #[test]
    fn test_parse_relative() {
        let settings = ServerTimeSettings::default();
        let ten_minutes_ago = (Utc::now() - chrono::Duration::minutes(10))
            .format(DEFAULT_SERVER_TIME_SHORT)
            .to_string();
        let uptime = settings.parse_relative(Some(&ten_minutes_ago));
        assert!(uptime >= Duration::from_secs(9 * 60));
        assert!(uptime <= Duration::from_secs(11 * 60));

        assert_eq!(settings.parse_relative(Some("nope")), Duration::ZERO);
        assert_eq!(settings.parse_relative(None), Duration::ZERO);
    }

    #[test]
    fn test_unknown_time_zone() {
        assert!(ServerTimeSettings::new("Mars/Olympus_Mons").is_err());
        assert!(ServerTimeSettings::new("Europe/Brussels").is_ok());
    }

    #[test]
    fn test_since_future_is_zero() {
        assert_eq!(since(Utc::now() + chrono::Duration::hours(1)), Duration::ZERO);
    }
}
