//! Date and time parsing for field values.
//!
//! The platform sends dates as `YYYY-MM-DD` (sometimes with a time part)
//! and times as `HH:MM`. Hand-filled text fields also show `DD.MM.YYYY`.

use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use crate::field::FieldValue;

lazy_static! {
    static ref ISO_DATE: Regex = Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})").unwrap();
    static ref DOTTED_DATE: Regex = Regex::new(r"\b(\d{2})\.(\d{2})\.(\d{4})\b").unwrap();
    static ref CLOCK_TIME: Regex = Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap();
}

/// Parse a date out of a text value.
pub fn parse_date(value: &FieldValue) -> Option<NaiveDate> {
    let text = value.as_text()?;

    if let Some(caps) = ISO_DATE.captures(text) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }
    if let Some(caps) = DOTTED_DATE.captures(text) {
        return ymd(&caps[3], &caps[2], &caps[1]);
    }
    None
}

/// Parse a wall-clock time out of a text value.
pub fn parse_time(value: &FieldValue) -> Option<NaiveTime> {
    let text = value.as_text()?;
    let caps = CLOCK_TIME.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
