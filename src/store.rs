//! Mirror store: the [`Store`] trait used by the services and its Postgres implementation.

use chrono::{NaiveDateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::upsert::excluded;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, info};
use std::collections::BTreeMap;

use crate::db::models::{DeviceRow, NewDevice, NewHistoricalReading, NewPowerStation};
use crate::schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Rows per INSERT statement; keeps bind parameters well under the Postgres limit.
const INSERT_CHUNK: usize = 1000;

#[derive(Debug)]
pub enum StoreError {
    Connection(String),
    Migration(String),
    Database {
        message: String,
        details: Option<String>,
        hint: Option<String>,
        constraint: Option<String>,
    },
    Query(String),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Connection(s) => write!(f, "connection failed: {}", s),
            StoreError::Migration(s) => write!(f, "migrations failed: {}", s),
            StoreError::Database {
                message,
                details,
                hint,
                constraint,
            } => {
                write!(f, "database error: {}", message)?;
                if let Some(d) = details {
                    write!(f, "; details: {}", d)?;
                }
                if let Some(h) = hint {
                    write!(f, "; hint: {}", h)?;
                }
                if let Some(c) = constraint {
                    write!(f, "; constraint: {}", c)?;
                }
                Ok(())
            }
            StoreError::Query(s) => write!(f, "query failed: {}", s),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DieselError> for StoreError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::DatabaseError(_, info) => StoreError::Database {
                message: info.message().to_string(),
                details: info.details().map(str::to_string),
                hint: info.hint().map(str::to_string),
                constraint: info.constraint_name().map(str::to_string),
            },
            other => StoreError::Query(other.to_string()),
        }
    }
}

pub trait Store {
    fn upsert_power_stations(&mut self, rows: &[NewPowerStation]) -> Result<usize, StoreError>;
    fn upsert_devices(&mut self, rows: &[NewDevice]) -> Result<usize, StoreError>;
    /// Insert-or-update on `(device_ps_key, timestamp)`.
    fn upsert_readings(&mut self, rows: &[NewHistoricalReading]) -> Result<usize, StoreError>;
    fn power_station_ids(&mut self) -> Result<Vec<i64>, StoreError>;
    /// Directory rows, optionally limited to the given stations.
    fn devices(&mut self, ps_ids: Option<&[i64]>) -> Result<Vec<DeviceRow>, StoreError>;
}

pub struct PgStore {
    conn: PgConnection,
}

impl PgStore {
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let conn = PgConnection::establish(database_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(PgStore { conn })
    }

    pub fn apply_migrations(&mut self) -> Result<(), StoreError> {
        let applied = self
            .conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        if applied.is_empty() {
            info!("Database schema is up to date; no migrations were applied");
        } else {
            let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            info!("Applied {} database migration(s): {}", applied.len(), names);
        }
        Ok(())
    }
}

/// Postgres refuses to touch one row twice in a single upsert; keep the last row per key.
pub fn dedupe_readings(rows: &[NewHistoricalReading]) -> Vec<NewHistoricalReading> {
    let mut by_key: BTreeMap<(&str, NaiveDateTime), &NewHistoricalReading> = BTreeMap::new();
    for r in rows {
        by_key.insert((r.device_ps_key.as_str(), r.timestamp), r);
    }
    by_key.into_values().cloned().collect()
}

impl Store for PgStore {
    fn upsert_power_stations(&mut self, rows: &[NewPowerStation]) -> Result<usize, StoreError> {
        use schema::power_stations::dsl as P;

        let mut total = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            total += diesel::insert_into(P::power_stations)
                .values(chunk)
                .on_conflict(P::ps_id)
                .do_update()
                .set((
                    (
                        P::ps_name.eq(excluded(P::ps_name)),
                        P::install_date.eq(excluded(P::install_date)),
                        P::latitude.eq(excluded(P::latitude)),
                        P::longitude.eq(excluded(P::longitude)),
                        P::online_status.eq(excluded(P::online_status)),
                        P::description.eq(excluded(P::description)),
                        P::valid_flag.eq(excluded(P::valid_flag)),
                        P::grid_connection_status.eq(excluded(P::grid_connection_status)),
                        P::ps_fault_status.eq(excluded(P::ps_fault_status)),
                        P::ps_location.eq(excluded(P::ps_location)),
                    ),
                    (
                        P::update_time_api.eq(excluded(P::update_time_api)),
                        P::ps_current_time_zone.eq(excluded(P::ps_current_time_zone)),
                        P::grid_connection_time.eq(excluded(P::grid_connection_time)),
                        P::connect_type.eq(excluded(P::connect_type)),
                        P::build_status.eq(excluded(P::build_status)),
                        P::ps_type.eq(excluded(P::ps_type)),
                        P::updated_at.eq(Utc::now()),
                    ),
                ))
                .execute(&mut self.conn)?;
        }
        Ok(total)
    }

    fn upsert_devices(&mut self, rows: &[NewDevice]) -> Result<usize, StoreError> {
        use schema::devices::dsl as D;

        let mut total = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            total += diesel::insert_into(D::devices)
                .values(chunk)
                .on_conflict(D::device_ps_key)
                .do_update()
                .set((
                    (
                        D::ps_id.eq(excluded(D::ps_id)),
                        D::device_type.eq(excluded(D::device_type)),
                        D::type_name.eq(excluded(D::type_name)),
                        D::device_sn.eq(excluded(D::device_sn)),
                        D::dev_status.eq(excluded(D::dev_status)),
                        D::factory_name.eq(excluded(D::factory_name)),
                        D::uuid.eq(excluded(D::uuid)),
                        D::grid_connection_date.eq(excluded(D::grid_connection_date)),
                        D::device_name.eq(excluded(D::device_name)),
                    ),
                    (
                        D::dev_fault_status.eq(excluded(D::dev_fault_status)),
                        D::rel_state.eq(excluded(D::rel_state)),
                        D::device_code.eq(excluded(D::device_code)),
                        D::device_model_id.eq(excluded(D::device_model_id)),
                        D::communication_dev_sn.eq(excluded(D::communication_dev_sn)),
                        D::device_model_code.eq(excluded(D::device_model_code)),
                        D::chnnl_id.eq(excluded(D::chnnl_id)),
                        D::updated_at.eq(Utc::now()),
                    ),
                ))
                .execute(&mut self.conn)?;
        }
        Ok(total)
    }

    fn upsert_readings(&mut self, rows: &[NewHistoricalReading]) -> Result<usize, StoreError> {
        use schema::historical_data::dsl as H;

        let rows = dedupe_readings(rows);
        if !rows.is_empty() {
            debug!("Upserting {} reading(s) into historical_data", rows.len());
        }
        // One response is one batch: a failing chunk rolls back the ones before it.
        let total = self.conn.transaction::<usize, DieselError, _>(|conn| {
            let mut total = 0;
            for chunk in rows.chunks(INSERT_CHUNK) {
                total += diesel::insert_into(H::historical_data)
                    .values(chunk)
                    .on_conflict((H::device_ps_key, H::timestamp))
                    .do_update()
                    .set((H::points.eq(excluded(H::points)), H::updated_at.eq(Utc::now())))
                    .execute(conn)?;
            }
            Ok(total)
        })?;
        Ok(total)
    }

    fn power_station_ids(&mut self) -> Result<Vec<i64>, StoreError> {
        use schema::power_stations::dsl as P;

        Ok(P::power_stations
            .select(P::ps_id)
            .order(P::ps_id.asc())
            .load(&mut self.conn)?)
    }

    fn devices(&mut self, ps_ids: Option<&[i64]>) -> Result<Vec<DeviceRow>, StoreError> {
        use schema::devices::dsl as D;

        let mut query = D::devices
            .select(DeviceRow::as_select())
            .order(D::device_ps_key.asc())
            .into_boxed();
        if let Some(ids) = ps_ids {
            query = query.filter(D::ps_id.eq_any(ids.to_vec()));
        }
        Ok(query.load(&mut self.conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .expect("valid time")
    }

    #[test]
    fn dedupe_keeps_last_row_per_key() {
        let rows = vec![
            NewHistoricalReading {
                device_ps_key: "a".into(),
                timestamp: at(0, 0),
                points: json!({ "p1": "1" }),
            },
            NewHistoricalReading {
                device_ps_key: "a".into(),
                timestamp: at(0, 5),
                points: json!({ "p1": "2" }),
            },
            NewHistoricalReading {
                device_ps_key: "a".into(),
                timestamp: at(0, 0),
                points: json!({ "p1": "3" }),
            },
        ];
        let out = dedupe_readings(&rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].points, json!({ "p1": "3" }));
        assert_eq!(out[1].timestamp, at(0, 5));
    }

    /// Needs a scratch Postgres in `TEST_DATABASE_URL`; skipped otherwise.
    /// Runs inside a test transaction, so nothing is left behind.
    #[test]
    fn failed_chunk_rolls_back_whole_reading_batch() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return;
        };
        let mut store = PgStore::connect(&url).expect("connect");
        store.conn.begin_test_transaction().expect("test transaction");
        store.apply_migrations().expect("migrations");

        // Keys sort as they are inserted; the NUL byte in the last one is rejected by
        // Postgres, and that row lands in the second chunk.
        let mut rows: Vec<NewHistoricalReading> = (0..INSERT_CHUNK)
            .map(|i| NewHistoricalReading {
                device_ps_key: format!("rollback-{:05}", i),
                timestamp: at(0, 0),
                points: json!({ "p1": "1" }),
            })
            .collect();
        rows.push(NewHistoricalReading {
            device_ps_key: "rollback-z\0".into(),
            timestamp: at(0, 0),
            points: json!({}),
        });

        assert!(store.upsert_readings(&rows).is_err());

        use schema::historical_data::dsl as H;
        let stored: i64 = H::historical_data
            .filter(H::device_ps_key.like("rollback-%"))
            .count()
            .get_result(&mut store.conn)
            .expect("count");
        assert_eq!(stored, 0);
    }

    #[test]
    fn database_error_display_includes_nested_detail() {
        let err = StoreError::Database {
            message: "duplicate key value".into(),
            details: Some("Key (ps_id)=(1) already exists.".into()),
            hint: None,
            constraint: Some("power_stations_pkey".into()),
        };
        let text = err.to_string();
        assert!(text.contains("duplicate key value"));
        assert!(text.contains("Key (ps_id)=(1)"));
        assert!(text.contains("power_stations_pkey"));
    }
}
