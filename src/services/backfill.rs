//! Historical range driver.
//!
//! A date range is cut into day batches of [`DAYS_PER_HISTORICAL_BATCH`] days, and each
//! batch into hour windows; the telemetry fetcher runs once per window so no request ever
//! spans more than an hour regardless of how long the backfill is.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};

use crate::client::SolarCloudClient;
use crate::config::{DAYS_PER_HISTORICAL_BATCH, DEFAULT_MINUTE_INTERVAL};
use crate::db::models::DeviceRow;
use crate::services::telemetry::{self, FetchLimits, FetchOutcome};
use crate::store::Store;
use crate::utils::{end_of_day, start_of_day};

/// Consecutive `[start, end]` batches of `days` calendar days; the last one is clamped to `end`.
pub fn day_batches(start: NaiveDateTime, end: NaiveDateTime, days: u32) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let step = Duration::days(i64::from(days.max(1)));
    let mut batches = Vec::new();
    let mut cur = start;
    while cur <= end {
        let batch_end = end_of_day((cur + step - Duration::days(1)).date()).min(end);
        batches.push((cur, batch_end));
        cur += step;
    }
    batches
}

/// Hour windows `[h:00:00, h:59:59]` covering `[start, end]`, the last clamped to `end`.
pub fn hour_windows(start: NaiveDateTime, end: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let hour = Duration::hours(1);
    let mut windows = Vec::new();
    let mut cur = start;
    while cur < end {
        windows.push((cur, (cur + hour - Duration::seconds(1)).min(end)));
        cur += hour;
    }
    windows
}

/// Keep devices whose resolved catalog type or raw `type_name` is in `types` (case-insensitive).
fn filter_by_type(devices: Vec<DeviceRow>, types: &[String]) -> Vec<DeviceRow> {
    let wanted: Vec<String> = types.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    devices
        .into_iter()
        .filter(|d| {
            let raw = d.type_name.as_deref().map(str::to_lowercase);
            wanted
                .iter()
                .any(|t| t == d.resolved_type() || raw.as_deref() == Some(t.as_str()))
        })
        .collect()
}

/// Backfill every day in `[start_date, end_date]` for the selected devices.
///
/// `Err` only for an inverted range or a failed directory query; request and upsert
/// failures are counted in the returned outcome.
pub fn fetch_range(
    client: &SolarCloudClient,
    store: &mut dyn Store,
    start_date: NaiveDate,
    end_date: NaiveDate,
    station_filter: Option<&[i64]>,
    type_filter: Option<&[String]>,
) -> Result<FetchOutcome, String> {
    let start = start_of_day(start_date);
    let end = end_of_day(end_date);
    if end <= start {
        return Err(format!("invalid range: end {} is before start {}", end_date, start_date));
    }

    let mut devices = store
        .devices(station_filter)
        .map_err(|e| format!("loading devices failed: {}", e))?;
    if let Some(types) = type_filter {
        devices = filter_by_type(devices, types);
    }
    if devices.is_empty() {
        warn!("Backfill: no devices match the requested stations/types; nothing to fetch");
        return Ok(FetchOutcome::default());
    }
    info!(
        "Backfill: {} device(s) from {} to {}",
        devices.len(),
        start_date,
        end_date
    );

    let limits = FetchLimits::default();
    let mut total = FetchOutcome::default();
    for (batch_start, batch_end) in day_batches(start, end, DAYS_PER_HISTORICAL_BATCH) {
        info!("Backfill: batch {} .. {}", batch_start, batch_end);
        let mut batch = FetchOutcome::default();
        for (from, to) in hour_windows(batch_start, batch_end) {
            batch += telemetry::fetch_window(client, store, &devices, from, to, DEFAULT_MINUTE_INTERVAL, &limits);
        }
        info!(
            "Backfill: batch {} .. {} done: {} row(s), {} of {} request(s) failed",
            batch_start.date(),
            batch_end.date(),
            batch.rows_upserted,
            batch.failed_requests,
            batch.requests
        );
        total += batch;
    }
    Ok(total)
}

pub fn yesterday_from(today: NaiveDate) -> NaiveDate {
    today - Duration::days(1)
}

/// Backfill yesterday (UTC) for every known device.
pub fn fetch_yesterday(client: &SolarCloudClient, store: &mut dyn Store) -> Result<FetchOutcome, String> {
    fetch_day_before(client, store, Utc::now().date_naive())
}

/// Backfill the single day before `today`, unfiltered.
pub fn fetch_day_before(
    client: &SolarCloudClient,
    store: &mut dyn Store,
    today: NaiveDate,
) -> Result<FetchOutcome, String> {
    let day = yesterday_from(today);
    info!("Backfill: fetching yesterday ({})", day);
    fetch_range(client, store, day, day, None, None)
}
