//! Diesel model structs for the mirror tables.
//!
//! `historical_data.points` holds whatever point columns the vendor returned for a record,
//! so one table serves every device type.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog;
use crate::models::isolarcloud::{DeviceRecord, PowerStationRecord};
use crate::schema;

#[derive(Debug, Clone, Default, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::power_stations)]
pub struct NewPowerStation {
    pub ps_id: i64,
    pub ps_name: Option<String>,
    pub install_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub online_status: Option<i64>,
    pub description: Option<String>,
    pub valid_flag: Option<i64>,
    pub grid_connection_status: Option<i64>,
    pub ps_fault_status: Option<i64>,
    pub ps_location: Option<String>,
    pub update_time_api: Option<String>,
    pub ps_current_time_zone: Option<String>,
    pub grid_connection_time: Option<String>,
    pub connect_type: Option<i64>,
    pub build_status: Option<i64>,
    pub ps_type: Option<i64>,
}

impl NewPowerStation {
    /// `None` when the vendor record carries no station id.
    pub fn from_record(rec: PowerStationRecord) -> Option<Self> {
        Some(NewPowerStation {
            ps_id: rec.ps_id?,
            ps_name: rec.ps_name,
            install_date: rec.install_date,
            latitude: rec.latitude,
            longitude: rec.longitude,
            online_status: rec.online_status,
            description: rec.description,
            valid_flag: rec.valid_flag,
            grid_connection_status: rec.grid_connection_status,
            ps_fault_status: rec.ps_fault_status,
            ps_location: rec.ps_location,
            update_time_api: rec.update_time,
            ps_current_time_zone: rec.ps_current_time_zone,
            grid_connection_time: rec.grid_connection_time,
            connect_type: rec.connect_type,
            build_status: rec.build_status,
            ps_type: rec.ps_type,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
pub struct NewDevice {
    pub device_ps_key: String,
    pub ps_id: i64,
    pub device_type: Option<i64>,
    pub type_name: Option<String>,
    pub device_sn: Option<String>,
    pub dev_status: Option<i64>,
    pub factory_name: Option<String>,
    pub uuid: Option<String>,
    pub grid_connection_date: Option<String>,
    pub device_name: Option<String>,
    pub dev_fault_status: Option<i64>,
    pub rel_state: Option<i64>,
    pub device_code: Option<i64>,
    pub device_model_id: Option<i64>,
    pub communication_dev_sn: Option<String>,
    pub device_model_code: Option<String>,
    pub chnnl_id: Option<i64>,
}

impl NewDevice {
    /// `station_id` is used when the record omits its own `ps_id`.
    /// `None` when the record has no device key.
    pub fn from_record(rec: DeviceRecord, station_id: i64) -> Option<Self> {
        let device_ps_key = rec.ps_key.filter(|k| !k.trim().is_empty())?;
        Some(NewDevice {
            device_ps_key,
            ps_id: rec.ps_id.unwrap_or(station_id),
            device_type: rec.device_type,
            type_name: rec.type_name,
            device_sn: rec.device_sn,
            dev_status: rec.dev_status,
            factory_name: rec.factory_name,
            uuid: rec.uuid,
            grid_connection_date: rec.grid_connection_date,
            device_name: rec.device_name,
            dev_fault_status: rec.dev_fault_status,
            rel_state: rec.rel_state,
            device_code: rec.device_code,
            device_model_id: rec.device_model_id,
            communication_dev_sn: rec.communication_dev_sn,
            device_model_code: rec.device_model_code,
            chnnl_id: rec.chnnl_id,
        })
    }
}

/// Directory projection used to plan telemetry requests.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeviceRow {
    pub device_ps_key: String,
    pub ps_id: i64,
    pub device_type: Option<i64>,
    pub type_name: Option<String>,
}

impl DeviceRow {
    pub fn resolved_type(&self) -> &'static str {
        catalog::resolve_device_type(self.type_name.as_deref(), self.device_type)
    }
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::historical_data)]
pub struct NewHistoricalReading {
    pub device_ps_key: String,
    /// Vendor-local wall-clock time, no offset applied.
    pub timestamp: NaiveDateTime,
    /// Point id -> value exactly as returned (e.g. `{"p1": "12.5"}`).
    pub points: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_without_id_is_dropped() {
        assert!(NewPowerStation::from_record(PowerStationRecord::default()).is_none());
    }

    #[test]
    fn station_update_time_maps_to_api_column() {
        let rec = PowerStationRecord {
            ps_id: Some(5),
            update_time: Some("2024-01-01 10:00:00".into()),
            ..PowerStationRecord::default()
        };
        let row = NewPowerStation::from_record(rec).expect("row");
        assert_eq!(row.update_time_api.as_deref(), Some("2024-01-01 10:00:00"));
    }

    #[test]
    fn device_inherits_station_when_record_has_none() {
        let rec = DeviceRecord {
            ps_key: Some("5_1_1_1".into()),
            ..DeviceRecord::default()
        };
        let row = NewDevice::from_record(rec, 5).expect("row");
        assert_eq!(row.ps_id, 5);
        assert_eq!(row.device_ps_key, "5_1_1_1");
    }

    #[test]
    fn device_without_key_is_dropped() {
        let rec = DeviceRecord {
            ps_key: Some("  ".into()),
            ps_id: Some(5),
            ..DeviceRecord::default()
        };
        assert!(NewDevice::from_record(rec, 5).is_none());
    }

    #[test]
    fn device_row_resolves_catalog_type() {
        let row = DeviceRow {
            device_ps_key: "k".into(),
            ps_id: 1,
            device_type: Some(7),
            type_name: None,
        };
        assert_eq!(row.resolved_type(), "meter");
    }
}
