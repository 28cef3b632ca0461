pub mod models {
    pub mod isolarcloud;
}

pub mod catalog;
pub mod client;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod store;
pub mod utils;
pub mod services {
    pub mod backfill;
    pub mod directory;
    pub mod telemetry;
}

#[cfg(test)]
mod testing;

use crate::client::{Credentials, SolarCloudClient, UreqTransport};
use crate::config::Config;
use crate::services::backfill;
use crate::services::directory::{self, SyncOutcome};
use crate::services::telemetry::FetchOutcome;
use crate::store::PgStore;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceTarget {
    All,
    Station(i64),
}

fn parse_device_target(raw: &str) -> Result<DeviceTarget, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("all") {
        return Ok(DeviceTarget::All);
    }
    raw.parse::<i64>()
        .map(DeviceTarget::Station)
        .map_err(|_| format!("expected a power station id or `all`, got {:?}", raw))
}

#[derive(Debug, Parser)]
#[command(name = "isolarcloud-harvester", version)]
#[command(about = "Mirror iSolarCloud stations, devices and minute telemetry into Postgres", long_about = None)]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Sync the power station list
    #[arg(long)]
    sync_powerstations: bool,

    /// Sync devices of one power station, or of every station in the database
    #[arg(long, value_name = "PS_ID|all", value_parser = parse_device_target)]
    sync_devices: Option<DeviceTarget>,

    /// Fetch minute data for an inclusive date range (YYYY-MM-DD YYYY-MM-DD)
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    fetch_historical: Option<Vec<NaiveDate>>,

    /// Limit --fetch-historical to these power stations
    #[arg(long, value_name = "ID,..", value_delimiter = ',')]
    ps_ids: Option<Vec<i64>>,

    /// Limit --fetch-historical to these device types (catalog or vendor type names)
    #[arg(long, value_name = "TYPE,..", value_delimiter = ',')]
    device_types: Option<Vec<String>>,

    /// Fetch minute data for yesterday (UTC) for every device
    #[arg(long)]
    fetch_yesterday: bool,
}

impl Cli {
    fn has_action(&self) -> bool {
        self.sync_powerstations || self.sync_devices.is_some() || self.fetch_historical.is_some() || self.fetch_yesterday
    }
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

/// Load `--env-file` (must exist) or an optional `./.env`. Variables already set win.
fn load_env(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile {
            path: path.to_path_buf(),
            explicit: true,
        }));
    }
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(format!("failed to load .env: {}", e)),
    }
}

fn log_sync(what: &str, o: &SyncOutcome) {
    info!(
        "{} finished: {} page(s), {} fetched, {} skipped, {} upserted{}{}",
        what,
        o.pages,
        o.fetched,
        o.skipped,
        o.upserted,
        if o.truncated { ", listing truncated" } else { "" },
        if o.upsert_failed { ", upsert FAILED" } else { "" }
    );
}

fn log_fetch(what: &str, o: &FetchOutcome) {
    info!(
        "{} finished: {} request(s) ({} failed), {} row(s) upserted ({} failed upsert(s)), {} record(s) and {} device slot(s) skipped",
        what,
        o.requests,
        o.failed_requests,
        o.rows_upserted,
        o.failed_upserts,
        o.records_skipped,
        o.devices_skipped
    );
}

fn run(cli: &Cli) -> Result<(), String> {
    if !cli.has_action() {
        let _ = Cli::command().print_help();
        println!();
        info!("No action specified");
        return Ok(());
    }
    if cli.fetch_historical.is_none() && (cli.ps_ids.is_some() || cli.device_types.is_some()) {
        warn!("--ps-ids/--device-types only apply to --fetch-historical; ignoring them");
    }

    // 1) Load config
    let cfg = Config::from_env()?;
    info!("Config loaded (base_url={}, sys_code={})", cfg.base_url, cfg.sys_code);

    // 2) Connect DB and apply pending migrations
    let mut store = PgStore::connect(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");
    store.apply_migrations().map_err(|e| format!("Applying database migrations failed: {}", e))?;

    // 3) Log in
    let client = SolarCloudClient::new(Box::new(UreqTransport::new()), cfg.base_url.clone(), Credentials::from(&cfg));
    client
        .authenticate()
        .map_err(|e| format!("iSolarCloud login failed (check credentials): {}", e))?;

    // 4) Actions, in a fixed order
    if cli.sync_powerstations {
        let outcome = directory::sync_power_stations(&client, &mut store);
        log_sync("Power station sync", &outcome);
    }

    match cli.sync_devices {
        Some(DeviceTarget::All) => match directory::sync_all_devices(&client, &mut store) {
            Ok(outcome) => log_sync("Device sync (all stations)", &outcome),
            Err(e) => error!("Device sync failed: {}", e),
        },
        Some(DeviceTarget::Station(ps_id)) => {
            let outcome = directory::sync_devices(&client, &mut store, ps_id);
            log_sync(&format!("Device sync for station {}", ps_id), &outcome);
        }
        None => {}
    }

    if let Some([start, end]) = cli.fetch_historical.as_deref() {
        match backfill::fetch_range(
            &client,
            &mut store,
            *start,
            *end,
            cli.ps_ids.as_deref(),
            cli.device_types.as_deref(),
        ) {
            Ok(outcome) => log_fetch(&format!("Historical fetch {} .. {}", start, end), &outcome),
            Err(e) => error!("Historical fetch failed: {}", e),
        }
    }

    if cli.fetch_yesterday {
        match backfill::fetch_yesterday(&client, &mut store) {
            Ok(outcome) => log_fetch("Yesterday fetch", &outcome),
            Err(e) => error!("Yesterday fetch failed: {}", e),
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "isolarcloud-harvester {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
