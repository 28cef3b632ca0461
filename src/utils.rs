use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Vendor timestamp layout, e.g. `20240131235959`.
pub const VENDOR_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn format_vendor_timestamp(ts: NaiveDateTime) -> String {
    ts.format(VENDOR_TIMESTAMP_FORMAT).to_string()
}

/// Parse a vendor `time_stamp`. The value is naive station-local time and is kept that way.
pub fn parse_vendor_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), VENDOR_TIMESTAMP_FORMAT)
}

pub fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

/// Last whole second of `day` (23:59:59).
pub fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| day.and_time(NaiveTime::MIN))
}
