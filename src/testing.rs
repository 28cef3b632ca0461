//! Test doubles shared by the unit tests: a scripted vendor transport and an in-memory store.

use chrono::NaiveDateTime;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use crate::client::{ClientError, Credentials, LOGIN_ENDPOINT, SolarCloudClient, Transport};
use crate::db::models::{DeviceRow, NewDevice, NewHistoricalReading, NewPowerStation};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

type Responder = Box<dyn FnMut(&str, &Value) -> Result<Value, ClientError>>;

pub struct ScriptedTransport {
    responder: RefCell<Responder>,
    log: Rc<RefCell<Vec<RecordedRequest>>>,
}

impl ScriptedTransport {
    /// `respond(endpoint, body)` produces the raw JSON reply for each request.
    pub fn new<F>(respond: F) -> Self
    where
        F: FnMut(&str, &Value) -> Result<Value, ClientError> + 'static,
    {
        ScriptedTransport {
            responder: RefCell::new(Box::new(respond)),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn log(&self) -> Rc<RefCell<Vec<RecordedRequest>>> {
        Rc::clone(&self.log)
    }
}

impl Transport for ScriptedTransport {
    fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value, ClientError> {
        let endpoint = url.find("/openapi").map(|i| &url[i..]).unwrap_or(url).to_string();
        self.log.borrow_mut().push(RecordedRequest {
            url: url.to_string(),
            endpoint: endpoint.clone(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: body.clone(),
        });
        let mut respond = self.responder.borrow_mut();
        (*respond)(&endpoint, body)
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        app_key: "app".into(),
        secret_key: "secret".into(),
        username: "user".into(),
        password: "pass".into(),
        sys_code: "901".into(),
    }
}

pub fn login_ok(token: &str) -> Value {
    json!({ "result_code": "1", "result_msg": "success", "result_data": { "token": token } })
}

pub fn ok_with(result_data: Value) -> Value {
    json!({ "result_code": "1", "result_msg": "success", "result_data": result_data })
}

/// Client already logged in, without the inter-request pause.
/// `respond` only sees non-login requests; logins always succeed.
pub fn logged_in_client<F>(mut respond: F) -> (SolarCloudClient, Rc<RefCell<Vec<RecordedRequest>>>)
where
    F: FnMut(&str, &Value) -> Result<Value, ClientError> + 'static,
{
    let transport = ScriptedTransport::new(move |endpoint, body| {
        if endpoint == LOGIN_ENDPOINT {
            Ok(login_ok("tok"))
        } else {
            respond(endpoint, body)
        }
    });
    let log = transport.log();
    let client = SolarCloudClient::new(Box::new(transport), "https://vendor.test", credentials())
        .with_request_delay(Duration::ZERO);
    client.authenticate().expect("scripted login");
    (client, log)
}

/// Keyed like the real tables so repeated upserts overwrite instead of duplicating.
#[derive(Default)]
pub struct MemoryStore {
    pub stations: BTreeMap<i64, NewPowerStation>,
    pub devices: BTreeMap<String, NewDevice>,
    pub readings: BTreeMap<(String, NaiveDateTime), Value>,
    pub station_upserts: usize,
    pub device_upserts: usize,
    pub reading_upserts: usize,
    /// Makes every reading upsert fail, for error-path tests.
    pub fail_readings: bool,
}

impl MemoryStore {
    pub fn with_devices(rows: Vec<NewDevice>) -> Self {
        let mut store = MemoryStore::default();
        for d in rows {
            store.devices.insert(d.device_ps_key.clone(), d);
        }
        store
    }
}

impl Store for MemoryStore {
    fn upsert_power_stations(&mut self, rows: &[NewPowerStation]) -> Result<usize, StoreError> {
        self.station_upserts += 1;
        for r in rows {
            self.stations.insert(r.ps_id, r.clone());
        }
        Ok(rows.len())
    }

    fn upsert_devices(&mut self, rows: &[NewDevice]) -> Result<usize, StoreError> {
        self.device_upserts += 1;
        for r in rows {
            self.devices.insert(r.device_ps_key.clone(), r.clone());
        }
        Ok(rows.len())
    }

    fn upsert_readings(&mut self, rows: &[NewHistoricalReading]) -> Result<usize, StoreError> {
        self.reading_upserts += 1;
        if self.fail_readings {
            return Err(StoreError::Database {
                message: "relation \"historical_data\" does not exist".into(),
                details: None,
                hint: None,
                constraint: None,
            });
        }
        for r in rows {
            self.readings
                .insert((r.device_ps_key.clone(), r.timestamp), r.points.clone());
        }
        Ok(rows.len())
    }

    fn power_station_ids(&mut self) -> Result<Vec<i64>, StoreError> {
        Ok(self.stations.keys().copied().collect())
    }

    fn devices(&mut self, ps_ids: Option<&[i64]>) -> Result<Vec<DeviceRow>, StoreError> {
        Ok(self
            .devices
            .values()
            .filter(|d| ps_ids.is_none_or(|ids| ids.contains(&d.ps_id)))
            .map(|d| DeviceRow {
                device_ps_key: d.device_ps_key.clone(),
                ps_id: d.ps_id,
                device_type: d.device_type,
                type_name: d.type_name.clone(),
            })
            .collect())
    }
}

/// Directory row with only the fields telemetry needs.
pub fn device(key: &str, ps_id: i64, type_name: Option<&str>, type_code: Option<i64>) -> NewDevice {
    NewDevice {
        device_ps_key: key.to_string(),
        ps_id,
        device_type: type_code,
        type_name: type_name.map(str::to_string),
        ..NewDevice::default()
    }
}
