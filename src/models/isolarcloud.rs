//! Wire types for the iSolarCloud OpenAPI endpoints used by the harvester.
//!
//! Notes
//! - Every response shares the `result_code` / `result_msg` / `result_data` envelope.
//! - The vendor is inconsistent about numbers vs. strings (ids, status codes, coordinates),
//!   so scalar fields are decoded leniently and absent/odd values become `None`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Common response envelope. `result_data` is kept raw and decoded per endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default, deserialize_with = "lenient_string")]
    pub result_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub result_msg: Option<String>,
    #[serde(default)]
    pub result_data: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub token: Option<String>,
}

/// One page of a paged listing (`getPowerStationList`, `getDeviceList`).
#[derive(Debug, Clone, Deserialize)]
pub struct PageList<T> {
    #[serde(rename = "pageList", default = "Option::default")]
    pub page_list: Option<Vec<T>>,
    #[serde(rename = "rowCount", default, deserialize_with = "lenient_i64")]
    pub row_count: Option<i64>,
}

impl<T> PageList<T> {
    pub fn into_items(self) -> Vec<T> {
        self.page_list.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PowerStationRecord {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub ps_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ps_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub install_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub online_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub valid_flag: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub grid_connection_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub ps_fault_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ps_location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub update_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ps_current_time_zone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub grid_connection_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub connect_type: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub build_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub ps_type: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub ps_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub ps_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub device_type: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub type_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_sn: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub dev_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub factory_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub grid_connection_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub dev_fault_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub rel_state: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub device_code: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub device_model_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub communication_dev_sn: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_model_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub chnnl_id: Option<i64>,
}

// =====================
// Lenient scalar decoding
// =====================

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_numeric_fields_given_as_strings() {
        let rec: PowerStationRecord = serde_json::from_value(json!({
            "ps_id": "1234567",
            "ps_name": "Roof A",
            "latitude": "46.05",
            "longitude": 14.5,
            "online_status": 1,
            "ps_fault_status": "",
            "description": null,
        }))
        .expect("decode station");

        assert_eq!(rec.ps_id, Some(1234567));
        assert_eq!(rec.latitude, Some(46.05));
        assert_eq!(rec.longitude, Some(14.5));
        assert_eq!(rec.online_status, Some(1));
        assert_eq!(rec.ps_fault_status, None);
        assert_eq!(rec.description, None);
    }

    #[test]
    fn device_uuid_number_becomes_text() {
        let rec: DeviceRecord = serde_json::from_value(json!({
            "ps_key": "1234567_1_1_1",
            "ps_id": 1234567,
            "uuid": 998877,
            "device_type": "1",
            "type_name": "Inverter",
        }))
        .expect("decode device");

        assert_eq!(rec.ps_key.as_deref(), Some("1234567_1_1_1"));
        assert_eq!(rec.uuid.as_deref(), Some("998877"));
        assert_eq!(rec.device_type, Some(1));
    }

    #[test]
    fn page_list_tolerates_missing_list() {
        let page: PageList<DeviceRecord> = serde_json::from_value(json!({ "rowCount": 0 })).expect("decode page");
        assert_eq!(page.row_count, Some(0));
        assert!(page.into_items().is_empty());
    }
}
