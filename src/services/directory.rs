//! Directory sync: mirror the vendor's station and device listings.
//!
//! Both walks page until a short page or until the accumulated count reaches `rowCount`,
//! then write everything in one upsert. A failed page ends the walk early; what was
//! gathered so far is still written, and the next run re-syncs from scratch anyway.

use log::{info, warn};

use crate::client::{ClientError, SolarCloudClient};
use crate::config::{DEVICE_PAGE_SIZE, STATION_PAGE_SIZE};
use crate::db::models::{NewDevice, NewPowerStation};
use crate::models::isolarcloud::PageList;
use crate::store::Store;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Pages that came back successfully.
    pub pages: usize,
    /// True when a page request failed and the walk stopped early.
    pub truncated: bool,
    /// Records received from the vendor.
    pub fetched: usize,
    /// Records dropped for lacking their natural key.
    pub skipped: usize,
    pub upserted: usize,
    pub upsert_failed: bool,
}

impl std::ops::AddAssign for SyncOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.pages += rhs.pages;
        self.truncated |= rhs.truncated;
        self.fetched += rhs.fetched;
        self.skipped += rhs.skipped;
        self.upserted += rhs.upserted;
        self.upsert_failed |= rhs.upsert_failed;
    }
}

/// Walk pages `1..` until done. Returns the items plus (pages fetched, truncated).
fn collect_pages<T, F>(what: &str, page_size: u32, mut fetch: F) -> (Vec<T>, usize, bool)
where
    F: FnMut(u32) -> Result<PageList<T>, ClientError>,
{
    let mut all = Vec::new();
    let mut page = 1u32;
    let mut pages = 0usize;

    loop {
        let list = match fetch(page) {
            Ok(list) => list,
            Err(e) => {
                warn!("{}: page {} failed ({}); ending walk", what, page, e);
                return (all, pages, true);
            }
        };
        pages += 1;
        let row_count = list.row_count;
        let items = list.into_items();
        if items.is_empty() {
            info!("{}: page {} is empty", what, page);
            break;
        }
        let on_page = items.len();
        all.extend(items);
        info!("{}: fetched page {} with {} record(s)", what, page, on_page);

        let reached_total = row_count.is_some_and(|n| n >= 0 && all.len() >= n as usize);
        if on_page < page_size as usize || reached_total {
            break;
        }
        page += 1;
    }
    (all, pages, false)
}

pub fn sync_power_stations(client: &SolarCloudClient, store: &mut dyn Store) -> SyncOutcome {
    info!("Sync: fetching power stations");
    let (records, pages, truncated) = collect_pages("Stations", STATION_PAGE_SIZE, |page| {
        client.get_power_station_page(page, STATION_PAGE_SIZE)
    });

    let mut outcome = SyncOutcome {
        pages,
        truncated,
        fetched: records.len(),
        ..SyncOutcome::default()
    };

    let rows: Vec<NewPowerStation> = records
        .into_iter()
        .filter_map(|rec| {
            let row = NewPowerStation::from_record(rec);
            if row.is_none() {
                warn!("Sync: skipping power station record without ps_id");
            }
            row
        })
        .collect();
    outcome.skipped = outcome.fetched - rows.len();

    if rows.is_empty() {
        info!("Sync: no power stations to write");
        return outcome;
    }
    match store.upsert_power_stations(&rows) {
        Ok(n) => {
            outcome.upserted = n;
            info!("Sync: upserted {} power station(s)", n);
        }
        Err(e) => {
            outcome.upsert_failed = true;
            warn!("Sync: upsert of {} power station(s) failed: {}", rows.len(), e);
        }
    }
    outcome
}

pub fn sync_devices(client: &SolarCloudClient, store: &mut dyn Store, ps_id: i64) -> SyncOutcome {
    info!("Sync: fetching devices for power station {}", ps_id);
    let what = format!("Devices of {}", ps_id);
    let (records, pages, truncated) = collect_pages(&what, DEVICE_PAGE_SIZE, |page| {
        client.get_device_page(ps_id, page, DEVICE_PAGE_SIZE)
    });

    let mut outcome = SyncOutcome {
        pages,
        truncated,
        fetched: records.len(),
        ..SyncOutcome::default()
    };

    let rows: Vec<NewDevice> = records
        .into_iter()
        .filter_map(|rec| {
            let row = NewDevice::from_record(rec, ps_id);
            if row.is_none() {
                warn!("Sync: skipping device of station {} without ps_key", ps_id);
            }
            row
        })
        .collect();
    outcome.skipped = outcome.fetched - rows.len();

    if rows.is_empty() {
        info!("Sync: no devices to write for power station {}", ps_id);
        return outcome;
    }
    match store.upsert_devices(&rows) {
        Ok(n) => {
            outcome.upserted = n;
            info!("Sync: upserted {} device(s) for power station {}", n, ps_id);
        }
        Err(e) => {
            outcome.upsert_failed = true;
            warn!("Sync: device upsert for power station {} failed: {}", ps_id, e);
        }
    }
    outcome
}

/// Sync devices for every station already mirrored in the store.
pub fn sync_all_devices(client: &SolarCloudClient, store: &mut dyn Store) -> Result<SyncOutcome, String> {
    let ids = store
        .power_station_ids()
        .map_err(|e| format!("listing mirrored power stations failed: {}", e))?;
    if ids.is_empty() {
        info!("Sync: no power stations in the store; run a station sync first");
    }
    let mut total = SyncOutcome::default();
    for ps_id in ids {
        total += sync_devices(client, store, ps_id);
    }
    Ok(total)
}
