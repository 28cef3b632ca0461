//! Minute-data fetcher: turns a device set and a time window into bounded vendor requests.
//!
//! Devices are grouped by station and catalog type; each group's key list and point list
//! are chunked to the per-request limits, and every (key chunk x point chunk) pair becomes
//! one request over the whole window. Each successful response is normalized into
//! `(device_ps_key, timestamp)` rows and upserted as one batch.

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::catalog::{self, UNKNOWN_DEVICE_TYPE};
use crate::client::{MinuteDataRequest, SolarCloudClient};
use crate::config::{MAX_POINTS_PER_REQUEST, MAX_PS_KEYS_PER_REQUEST};
use crate::db::models::{DeviceRow, NewHistoricalReading};
use crate::store::Store;
use crate::utils::{format_vendor_timestamp, parse_vendor_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub max_keys_per_request: usize,
    pub max_points_per_request: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        FetchLimits {
            max_keys_per_request: MAX_PS_KEYS_PER_REQUEST,
            max_points_per_request: MAX_POINTS_PER_REQUEST,
        }
    }
}

/// Counters for one fetch; partial failures show up here instead of aborting the run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub requests: usize,
    pub failed_requests: usize,
    pub rows_upserted: usize,
    pub failed_upserts: usize,
    /// Records dropped for a missing or unparsable `time_stamp`.
    pub records_skipped: usize,
    /// Devices left out because their type did not resolve or has no points.
    pub devices_skipped: usize,
}

impl std::ops::AddAssign for FetchOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.requests += rhs.requests;
        self.failed_requests += rhs.failed_requests;
        self.rows_upserted += rhs.rows_upserted;
        self.failed_upserts += rhs.failed_upserts;
        self.records_skipped += rhs.records_skipped;
        self.devices_skipped += rhs.devices_skipped;
    }
}

/// Group device keys by `(ps_id, resolved type)`. Unresolved devices are returned separately.
pub fn group_devices(devices: &[DeviceRow]) -> (BTreeMap<(i64, &'static str), Vec<String>>, Vec<String>) {
    let mut groups: BTreeMap<(i64, &'static str), Vec<String>> = BTreeMap::new();
    let mut unresolved = Vec::new();
    for d in devices {
        let kind = d.resolved_type();
        if kind == UNKNOWN_DEVICE_TYPE {
            unresolved.push(d.device_ps_key.clone());
        } else {
            groups.entry((d.ps_id, kind)).or_default().push(d.device_ps_key.clone());
        }
    }
    (groups, unresolved)
}

/// Flatten a minute-data `result_data` map into rows.
///
/// Returns the rows and the number of records dropped for a bad `time_stamp`.
/// Every field other than `time_stamp` is copied verbatim into `points`.
pub fn parse_minute_records(result_data: BTreeMap<String, Value>) -> (Vec<NewHistoricalReading>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (ps_key, records) in result_data {
        let Value::Array(records) = records else {
            warn!("Telemetry: expected a record list for {}; skipping", ps_key);
            continue;
        };
        for record in records {
            let Value::Object(fields) = record else {
                warn!("Telemetry: non-object record for {}; skipping", ps_key);
                skipped += 1;
                continue;
            };

            let raw_ts = fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("time_stamp"))
                .and_then(|(_, v)| v.as_str())
                .map(str::to_string);
            let Some(raw_ts) = raw_ts else {
                warn!("Telemetry: record for {} has no time_stamp; skipping", ps_key);
                skipped += 1;
                continue;
            };
            let timestamp = match parse_vendor_timestamp(&raw_ts) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!("Telemetry: bad time_stamp {:?} for {}: {}; skipping", raw_ts, ps_key, e);
                    skipped += 1;
                    continue;
                }
            };

            let points: Map<String, Value> = fields
                .into_iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case("time_stamp"))
                .collect();
            rows.push(NewHistoricalReading {
                device_ps_key: ps_key.clone(),
                timestamp,
                points: Value::Object(points),
            });
        }
    }
    (rows, skipped)
}

/// Fetch and store minute data for `devices` over `[start, end]`.
pub fn fetch_window(
    client: &SolarCloudClient,
    store: &mut dyn Store,
    devices: &[DeviceRow],
    start: NaiveDateTime,
    end: NaiveDateTime,
    minute_interval: u32,
    limits: &FetchLimits,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();
    if devices.is_empty() {
        info!("Telemetry: no devices to fetch");
        return outcome;
    }

    let (groups, unresolved) = group_devices(devices);
    if !unresolved.is_empty() {
        warn!(
            "Telemetry: skipping {} device(s) of unknown type: {}",
            unresolved.len(),
            unresolved.join(", ")
        );
        outcome.devices_skipped += unresolved.len();
    }

    let start_ts = format_vendor_timestamp(start);
    let end_ts = format_vendor_timestamp(end);
    let key_chunk = limits.max_keys_per_request.max(1);
    let point_chunk = limits.max_points_per_request.max(1);

    for ((ps_id, kind), keys) in &groups {
        let points = catalog::points_for_device_type(kind);
        if points.is_empty() {
            warn!("Telemetry: no points configured for {} at station {}; skipping", kind, ps_id);
            outcome.devices_skipped += keys.len();
            continue;
        }

        for key_batch in keys.chunks(key_chunk) {
            for point_batch in points.chunks(point_chunk) {
                debug!(
                    "Telemetry: station {} {} x{} device(s), {} point(s), {}..{}",
                    ps_id,
                    kind,
                    key_batch.len(),
                    point_batch.len(),
                    start_ts,
                    end_ts
                );
                let req = MinuteDataRequest {
                    ps_keys: key_batch,
                    points: point_batch,
                    start_time_stamp: start_ts.clone(),
                    end_time_stamp: end_ts.clone(),
                    minute_interval,
                };
                outcome.requests += 1;
                let data = match client.get_minute_data(&req) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("Telemetry: minute data request for station {} ({}) failed: {}", ps_id, kind, e);
                        outcome.failed_requests += 1;
                        continue;
                    }
                };

                let (rows, skipped) = parse_minute_records(data);
                outcome.records_skipped += skipped;
                if rows.is_empty() {
                    debug!("Telemetry: empty response for station {} ({})", ps_id, kind);
                    continue;
                }
                match store.upsert_readings(&rows) {
                    Ok(n) => outcome.rows_upserted += n,
                    Err(e) => {
                        warn!("Telemetry: upsert of {} row(s) failed: {}", rows.len(), e);
                        outcome.failed_upserts += 1;
                    }
                }
            }
        }
    }
    outcome
}
