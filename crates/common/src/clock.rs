use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used for replays and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exchange session definition, as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// IANA timezone name of the exchange.
    pub timezone: String,
    pub open: NaiveTime,
    pub close: NaiveTime,
    /// Length of the forced-exit window before the close.
    pub pre_close_minutes: u32,
    /// Minutes after the open at which the opening-candle trigger fires.
    pub opening_trigger_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            open: NaiveTime::from_hms_opt(9, 30, 0).expect("valid session open"),
            close: NaiveTime::from_hms_opt(16, 0, 0).expect("valid session close"),
            pre_close_minutes: 5,
            opening_trigger_minutes: 5,
        }
    }
}

/// Pure calendar logic: regular weekday sessions in the exchange timezone.
/// Exchange holidays are not modelled.
#[derive(Debug, Clone)]
pub struct MarketHours {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    pre_close: Duration,
    trigger_offset: Duration,
}

impl MarketHours {
    pub fn new(cfg: &SessionConfig) -> Result<Self> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|e| Error::Config(format!("invalid timezone '{}': {e}", cfg.timezone)))?;
        if cfg.open >= cfg.close {
            return Err(Error::Config(format!(
                "session open {} must be before close {}",
                cfg.open, cfg.close
            )));
        }
        let length = cfg.close - cfg.open;
        let pre_close = Duration::minutes(i64::from(cfg.pre_close_minutes));
        let trigger_offset = Duration::minutes(i64::from(cfg.opening_trigger_minutes));
        if pre_close >= length || trigger_offset >= length {
            return Err(Error::Config(
                "pre-close window and opening trigger must fit inside the session".into(),
            ));
        }
        Ok(Self {
            tz,
            open: cfg.open,
            close: cfg.close,
            pre_close,
            trigger_offset,
        })
    }

    /// Exchange-local calendar date of `now`.
    pub fn session_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Open and close instants for `date`, or `None` on weekends.
    pub fn market_hours(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return None;
        }
        let open = self
            .tz
            .from_local_datetime(&date.and_time(self.open))
            .earliest()?
            .with_timezone(&Utc);
        let close = self
            .tz
            .from_local_datetime(&date.and_time(self.close))
            .earliest()?
            .with_timezone(&Utc);
        Some((open, close))
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.todays_hours(now)
            .map_or(false, |(open, close)| open <= now && now < close)
    }

    /// Inside the last `pre_close_minutes` of the session.
    pub fn in_pre_close_window(&self, now: DateTime<Utc>) -> bool {
        self.todays_hours(now)
            .map_or(false, |(_, close)| close - self.pre_close <= now && now < close)
    }

    /// The one-minute window in which the opening candle is evaluated.
    pub fn opening_trigger(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (open, _) = self.market_hours(date)?;
        let start = open + self.trigger_offset;
        Some((start, start + Duration::minutes(1)))
    }

    pub fn in_opening_trigger(&self, now: DateTime<Utc>) -> bool {
        self.opening_trigger(self.session_date(now))
            .map_or(false, |(start, end)| start <= now && now < end)
    }

    fn todays_hours(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.market_hours(self.session_date(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn et(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn hours() -> MarketHours {
        MarketHours::new(&SessionConfig::default()).unwrap()
    }

    #[test]
    fn open_during_regular_session() {
        let h = hours();
        // Monday 2024-03-04
        assert!(!h.is_open(et(2024, 3, 4, 9, 29, 59)));
        assert!(h.is_open(et(2024, 3, 4, 9, 30, 0)));
        assert!(h.is_open(et(2024, 3, 4, 15, 59, 59)));
        assert!(!h.is_open(et(2024, 3, 4, 16, 0, 0)));
    }

    #[test]
    fn closed_on_weekends() {
        let h = hours();
        assert!(!h.is_open(et(2024, 3, 2, 11, 0, 0)));
        assert!(!h.is_open(et(2024, 3, 3, 11, 0, 0)));
    }

    #[test]
    fn session_follows_daylight_saving() {
        let h = hours();
        let winter = h.market_hours(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()).unwrap();
        let summer = h.market_hours(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()).unwrap();
        assert_eq!(winter.0.format("%H:%M").to_string(), "14:30");
        assert_eq!(summer.0.format("%H:%M").to_string(), "13:30");
    }

    #[test]
    fn pre_close_window_is_last_five_minutes() {
        let h = hours();
        assert!(!h.in_pre_close_window(et(2024, 3, 4, 15, 54, 59)));
        assert!(h.in_pre_close_window(et(2024, 3, 4, 15, 55, 0)));
        assert!(h.in_pre_close_window(et(2024, 3, 4, 15, 59, 30)));
        assert!(!h.in_pre_close_window(et(2024, 3, 4, 16, 0, 0)));
    }

    #[test]
    fn configurable_pre_close_window() {
        let h = MarketHours::new(&SessionConfig {
            pre_close_minutes: 10,
            ..SessionConfig::default()
        })
        .unwrap();
        assert!(h.in_pre_close_window(et(2024, 3, 4, 15, 50, 0)));
    }

    #[test]
    fn opening_trigger_is_one_minute_wide() {
        let h = hours();
        assert!(!h.in_opening_trigger(et(2024, 3, 4, 9, 34, 59)));
        assert!(h.in_opening_trigger(et(2024, 3, 4, 9, 35, 0)));
        assert!(h.in_opening_trigger(et(2024, 3, 4, 9, 35, 59)));
        assert!(!h.in_opening_trigger(et(2024, 3, 4, 9, 36, 0)));
    }

    #[test]
    fn rejects_bad_session_config() {
        let bad_tz = SessionConfig {
            timezone: "Mars/Olympus".into(),
            ..SessionConfig::default()
        };
        assert!(matches!(MarketHours::new(&bad_tz), Err(Error::Config(_))));

        let inverted = SessionConfig {
            open: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            ..SessionConfig::default()
        };
        assert!(MarketHours::new(&inverted).is_err());
    }

    #[test]
    fn manual_clock_advances() {
        let start = et(2024, 3, 4, 9, 0, 0);
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now(), et(2024, 3, 4, 9, 30, 0));
    }
}
