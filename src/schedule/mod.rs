use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::ExtractorError;

/// Length of one archived segment
pub const SEGMENT_MINUTES: i64 = 30;

/// Largest number of hours that can be requested at once
pub const MAX_HOURS: u32 = 24;

/// One 30-minute audio segment, identified by its UTC start time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: NaiveDateTime,
}

impl Segment {
    /// Local file name, e.g. `0030Z.mp3`
    pub fn file_name(&self) -> String {
        format!("{}Z.mp3", self.start.format("%H%M"))
    }

    /// Remote file name, e.g. `Jan-05-2021-0030Z.mp3`
    pub fn remote_name(&self) -> String {
        format!("{}Z.mp3", self.start.format("%b-%d-%Y-%H%M"))
    }

    /// Download URL; the base is used as a plain prefix
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.remote_name())
    }
}

/// Segments for `hours` hours starting at `start_time`, never crossing into the next day
pub fn plan_segments(date: NaiveDate, start_time: NaiveTime, hours: u32) -> Vec<Segment> {
    let first = date.and_time(start_time);

    (0..i64::from(hours) * 2)
        .map(|i| first + Duration::minutes(SEGMENT_MINUTES * i))
        .take_while(|start| start.date() == date)
        .map(|start| Segment { start })
        .collect()
}

/// Parse a `YYMMDD` date in the 2020s
pub fn parse_date(value: &str) -> Result<NaiveDate, ExtractorError> {
    let invalid = || ExtractorError::InvalidDate(value.to_string());
    let bytes = value.as_bytes();

    let shape_ok = bytes.len() == 6
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] == b'2'
        && bytes[2] <= b'1'
        && bytes[4] <= b'3';
    if !shape_ok {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(value, "%y%m%d").map_err(|_| invalid())
}

/// Parse an `HHMM` start time on a half-hour boundary
pub fn parse_start_time(value: &str) -> Result<NaiveTime, ExtractorError> {
    let invalid = || ExtractorError::InvalidStartTime(value.to_string());
    let bytes = value.as_bytes();

    let shape_ok = bytes.len() == 4
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] <= b'2'
        && matches!(&value[2..], "00" | "30");
    if !shape_ok {
        return Err(invalid());
    }

    NaiveTime::parse_from_str(value, "%H%M").map_err(|_| invalid())
}

/// Parse an hour count between 1 and 24
pub fn parse_hours(value: &str) -> Result<u32, ExtractorError> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|hours| (1..=MAX_HOURS).contains(hours))
        .ok_or_else(|| ExtractorError::InvalidHours(value.to_string()))
}
