//! Session time scale: maps a time of day to a fixed-width bucket index.

use std::fmt;

use chrono::{NaiveTime, TimeDelta, Timelike};

use crate::error::TimeScaleError;
use crate::types::EncodedTime;

const DEFAULT_SESSION_START: NaiveTime = hms(9, 30, 0);
const DEFAULT_SESSION_END: NaiveTime = hms(15, 0, 0);
const DEFAULT_BUCKET_SECONDS: u32 = 60;

const fn hms(hour: u32, min: u32, sec: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, min, sec) {
        Some(t) => t,
        None => panic!("invalid session bound"),
    }
}

/// Splits a trading session into `bucket_seconds` wide ticks.
///
/// Tick 0 starts at `session_start`. Times before the session map to a
/// negative index; times after `session_end` keep extrapolating, so callers
/// needing an upper bound must check [`TimeScale::contains`] themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeScale {
    start: NaiveTime,
    end: NaiveTime,
    bucket_seconds: u32,
}

impl Default for TimeScale {
    /// 09:30:00 to 15:00:00 in one-minute buckets.
    fn default() -> Self {
        Self {
            start: DEFAULT_SESSION_START,
            end: DEFAULT_SESSION_END,
            bucket_seconds: DEFAULT_BUCKET_SECONDS,
        }
    }
}

impl TimeScale {
    pub fn new(
        start: NaiveTime,
        end: NaiveTime,
        bucket_seconds: u32,
    ) -> Result<Self, TimeScaleError> {
        if bucket_seconds == 0 {
            return Err(TimeScaleError::ZeroBucket);
        }
        if end < start {
            return Err(TimeScaleError::InvertedSession {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start,
            end,
            bucket_seconds,
        })
    }

    /// Build a scale from `"HH:MM:SS"` session bounds.
    pub fn parse(start: &str, end: &str, bucket_seconds: u32) -> Result<Self, TimeScaleError> {
        Self::new(parse_hms(start)?, parse_hms(end)?, bucket_seconds)
    }

    pub fn session_start(&self) -> NaiveTime {
        self.start
    }

    pub fn session_end(&self) -> NaiveTime {
        self.end
    }

    pub fn bucket_seconds(&self) -> u32 {
        self.bucket_seconds
    }

    fn bucket_millis(&self) -> i64 {
        i64::from(self.bucket_seconds) * 1000
    }

    /// `floor((time_of_day - session_start) / bucket)`; negative before the session.
    pub fn tick_index_for(&self, time_of_day: NaiveTime) -> i64 {
        let elapsed = (time_of_day - self.start).num_milliseconds();
        elapsed.div_euclid(self.bucket_millis())
    }

    pub fn tick_index_for_str(&self, time_of_day: &str) -> Result<i64, TimeScaleError> {
        parse_hms(time_of_day).map(|t| self.tick_index_for(t))
    }

    /// Tick index of an encoded `HHMMSSmmm` timestamp, `None` if it does not decode.
    pub fn tick_index_for_encoded(&self, encoded: EncodedTime) -> Option<i64> {
        decode_time(encoded).map(|t| self.tick_index_for(t))
    }

    /// Start of tick `tick_index`, or `None` if it falls outside the day.
    pub fn time_for(&self, tick_index: i64) -> Option<NaiveTime> {
        let offset = tick_index.checked_mul(i64::from(self.bucket_seconds))?;
        let delta = TimeDelta::try_seconds(offset)?;
        let (time, wrapped) = self.start.overflowing_add_signed(delta);
        (wrapped == 0).then_some(time)
    }

    /// Number of ticks needed to cover the session, counting a partial last bucket.
    pub fn tick_count(&self) -> i64 {
        let len = (self.end - self.start).num_milliseconds();
        let bucket = self.bucket_millis();
        (len + bucket - 1) / bucket
    }

    /// True when `time_of_day` lies within `[session_start, session_end]`.
    pub fn contains(&self, time_of_day: NaiveTime) -> bool {
        time_of_day >= self.start && time_of_day <= self.end
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} every {}s",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S"),
            self.bucket_seconds
        )
    }
}

fn parse_hms(s: &str) -> Result<NaiveTime, TimeScaleError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
        .map_err(|_| TimeScaleError::InvalidTime(s.to_string()))
}

/// Decode a `HHMMSSmmm` wire timestamp (e.g. `93000111` is 09:30:00.111).
pub fn decode_time(encoded: EncodedTime) -> Option<NaiveTime> {
    if encoded < 0 {
        return None;
    }
    let millis = (encoded % 1000) as u32;
    let secs = (encoded / 1000 % 100) as u32;
    let mins = (encoded / 100_000 % 100) as u32;
    let hours = u32::try_from(encoded / 10_000_000).ok()?;
    NaiveTime::from_hms_milli_opt(hours, mins, secs, millis)
}

/// Inverse of [`decode_time`]; sub-millisecond precision is truncated.
pub fn encode_time(time: NaiveTime) -> EncodedTime {
    let millis = i64::from(time.nanosecond() / 1_000_000).min(999);
    i64::from(time.hour()) * 10_000_000
        + i64::from(time.minute()) * 100_000
        + i64::from(time.second()) * 1000
        + millis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_hms(s).unwrap()
    }

    #[test]
    fn test_default_session() {
        let scale = TimeScale::parse("09:30:00", "15:00:00", 60).unwrap();
        assert_eq!(scale, TimeScale::default());

        assert_eq!(scale.tick_index_for_str("09:30:00").unwrap(), 0);
        assert_eq!(scale.tick_index_for_str("09:30:30").unwrap(), 0);
        assert_eq!(scale.tick_index_for_str("09:31:00").unwrap(), 1);
        assert!(scale.tick_index_for_str("08:45:00").unwrap() < 0);
        assert_eq!(scale.tick_index_for_str("09:29:59").unwrap(), -1);
    }

    #[test]
    fn test_inverse() {
        let scale = TimeScale::default();
        for i in 0..=scale.tick_count() + 10 {
            let time = scale.time_for(i).unwrap();
            assert_eq!(scale.tick_index_for(time), i);
        }
        assert_eq!(scale.time_for(0), Some(t("09:30:00")));
        assert_eq!(scale.time_for(2), Some(t("09:32:00")));
    }

    #[test]
    fn test_extrapolates_past_close() {
        let scale = TimeScale::default();
        assert_eq!(scale.tick_count(), 330);
        assert_eq!(scale.tick_index_for(t("15:00:00")), 330);
        assert_eq!(scale.tick_index_for(t("16:00:00")), 390);
        assert!(!scale.contains(t("16:00:00")));
        assert!(scale.contains(t("11:00:00")));
    }

    #[test]
    fn test_time_for_outside_day() {
        let scale = TimeScale::default();
        assert_eq!(scale.time_for(-1), Some(t("09:29:00")));
        assert_eq!(scale.time_for(24 * 60), None);
        assert_eq!(scale.time_for(i64::MAX), None);
    }

    #[test]
    fn test_invalid_scales() {
        assert_eq!(
            TimeScale::parse("09:30:00", "15:00:00", 0),
            Err(TimeScaleError::ZeroBucket)
        );
        assert!(matches!(
            TimeScale::parse("15:00:00", "09:30:00", 60),
            Err(TimeScaleError::InvertedSession { .. })
        ));
        assert_eq!(
            TimeScale::parse("9h30", "15:00:00", 60),
            Err(TimeScaleError::InvalidTime("9h30".to_string()))
        );
    }

    #[test]
    fn test_coarse_buckets() {
        let scale = TimeScale::parse("09:30:00", "11:30:00", 300).unwrap();
        assert_eq!(scale.tick_count(), 24);
        assert_eq!(scale.tick_index_for(t("09:34:59")), 0);
        assert_eq!(scale.tick_index_for(t("09:35:00")), 1);
        assert_eq!(scale.to_string(), "09:30:00-11:30:00 every 300s");
    }

    #[test]
    fn test_decode_time() {
        let decoded = decode_time(93000111).unwrap();
        assert_eq!(decoded, NaiveTime::from_hms_milli_opt(9, 30, 0, 111).unwrap());
        assert_eq!(decode_time(92018000), Some(t("09:20:18")));
        assert_eq!(decode_time(145959999).map(encode_time), Some(145959999));
        assert_eq!(decode_time(0), Some(NaiveTime::MIN));
        assert_eq!(decode_time(-5), None);
        assert_eq!(decode_time(256000000), None);
        assert_eq!(decode_time(96000000), None);
    }

    #[test]
    fn test_encoded_tick_index() {
        let scale = TimeScale::default();
        assert_eq!(scale.tick_index_for_encoded(93130810), Some(1));
        assert_eq!(scale.tick_index_for_encoded(92018000), Some(-10));
        assert_eq!(scale.tick_index_for_encoded(99999999), None);
    }
}
