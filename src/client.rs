//! Blocking client for the iSolarCloud OpenAPI (POST + JSON endpoints).
//!
//! - The HTTP layer sits behind [`Transport`]; production uses `ureq`.
//! - One bearer token per process, obtained by [`SolarCloudClient::authenticate`].
//! - A token-expired result code triggers a single re-login and one retry of the same request.
//! - Every issued call is followed by a fixed pause to respect the vendor's hourly request quota.

use http::header::ACCEPT;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use crate::config::{Config, REQUEST_DELAY};
use crate::models::isolarcloud::*;

pub const LOGIN_ENDPOINT: &str = "/openapi/login";
pub const POWER_STATION_LIST_ENDPOINT: &str = "/openapi/getPowerStationList";
pub const DEVICE_LIST_ENDPOINT: &str = "/openapi/getDeviceList";
pub const MINUTE_DATA_ENDPOINT: &str = "/openapi/getDevicePointMinuteDataList";

pub const RESULT_OK: &str = "1";
pub const RESULT_TOKEN_EXPIRED: &str = "30001";

#[derive(Debug)]
pub enum ClientError {
    NotAuthenticated,
    Transport(String),
    Http { status: u16, message: String },
    Decode(String),
    Api { code: String, message: String },
    Auth(String),
}

impl core::fmt::Display for ClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ClientError::NotAuthenticated => write!(f, "not logged in; call authenticate() first"),
            ClientError::Transport(s) => write!(f, "transport error: {}", s),
            ClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            ClientError::Decode(s) => write!(f, "decode error: {}", s),
            ClientError::Api { code, message } => write!(f, "api error {}: {}", code, message),
            ClientError::Auth(s) => write!(f, "auth error: {}", s),
        }
    }
}

impl std::error::Error for ClientError {}

/// Decode a JSON value into `T`, naming the failing path on error.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_path_to_error::deserialize(value).map_err(|e| ClientError::Decode(format!("{}: {}", e.path(), e.inner())))
}

/// Minimal HTTP seam: POST a JSON body, get a JSON body back.
pub trait Transport {
    fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value, ClientError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        UreqTransport {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value, ClientError> {
        let mut req = self.agent.post(url).header(ACCEPT, "application/json");
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        match req.send_json(body) {
            Ok(mut res) => {
                let text = res
                    .body_mut()
                    .read_to_string()
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                let de = &mut serde_json::Deserializer::from_str(&text);
                serde_path_to_error::deserialize(de)
                    .map_err(|e| ClientError::Decode(format!("{}: {}", e.path(), e.inner())))
            }
            Err(ureq::Error::StatusCode(status)) => Err(ClientError::Http {
                status,
                message: format!("POST {} rejected", url),
            }),
            Err(e) => Err(ClientError::Transport(e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_key: String,
    pub secret_key: String,
    pub username: String,
    pub password: String,
    pub sys_code: String,
}

impl From<&Config> for Credentials {
    fn from(cfg: &Config) -> Self {
        Credentials {
            app_key: cfg.app_key.clone(),
            secret_key: cfg.secret_key.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            sys_code: cfg.sys_code.clone(),
        }
    }
}

/// Parameters of one `getDevicePointMinuteDataList` request.
#[derive(Debug, Clone)]
pub struct MinuteDataRequest<'a> {
    pub ps_keys: &'a [String],
    pub points: &'a [String],
    /// Vendor format `YYYYMMDDHHMMSS`.
    pub start_time_stamp: String,
    pub end_time_stamp: String,
    pub minute_interval: u32,
}

pub struct SolarCloudClient {
    transport: Box<dyn Transport>,
    base_url: String,
    credentials: Credentials,
    token: RefCell<Option<String>>,
    request_delay: Duration,
}

impl SolarCloudClient {
    pub fn new(transport: Box<dyn Transport>, base_url: impl Into<String>, credentials: Credentials) -> Self {
        SolarCloudClient {
            transport,
            base_url: base_url.into(),
            credentials,
            token: RefCell::new(None),
            request_delay: REQUEST_DELAY,
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    fn post(&self, endpoint: &str, body: &Value) -> Result<ApiEnvelope, ClientError> {
        let headers = [
            ("x-access-key", self.credentials.secret_key.as_str()),
            ("sys_code", self.credentials.sys_code.as_str()),
        ];
        let raw = self.transport.post_json(&self.url(endpoint), &headers, body)?;
        decode(raw)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.borrow().is_some()
    }

    /// Log in with the configured account and keep the returned token.
    pub fn authenticate(&self) -> Result<(), ClientError> {
        let body = json!({
            "appkey": self.credentials.app_key,
            "user_account": self.credentials.username,
            "user_password": self.credentials.password,
        });
        let env = self.post(LOGIN_ENDPOINT, &body)?;

        if env.result_code.as_deref() != Some(RESULT_OK) {
            return Err(ClientError::Auth(format!(
                "login rejected (code {}): {}",
                env.result_code.as_deref().unwrap_or("-"),
                env.result_msg.as_deref().unwrap_or("-")
            )));
        }
        let data: LoginData = decode(env.result_data)?;
        match data.token {
            Some(t) if !t.is_empty() => {
                *self.token.borrow_mut() = Some(t);
                info!("Logged into iSolarCloud");
                Ok(())
            }
            _ => Err(ClientError::Auth("login succeeded but no token in response".to_string())),
        }
    }

    /// Authenticated call; `Ok` only for a success result code.
    ///
    /// Adds `token` and `appkey` to the payload. On the token-expired code the client logs in
    /// again and replays the request exactly once. The fixed request delay follows every call
    /// that reached the network, successful or not.
    pub fn call(&self, endpoint: &str, payload: Map<String, Value>) -> Result<ApiEnvelope, ClientError> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        let result = self.call_with_relogin(endpoint, payload);
        self.pause();
        result
    }

    fn call_with_relogin(&self, endpoint: &str, mut payload: Map<String, Value>) -> Result<ApiEnvelope, ClientError> {
        payload.insert("appkey".into(), Value::String(self.credentials.app_key.clone()));
        self.attach_token(&mut payload)?;
        debug!("POST {} payload keys: {:?}", endpoint, payload.keys().collect::<Vec<_>>());

        let env = self.post(endpoint, &Value::Object(payload.clone()))?;
        match env.result_code.as_deref() {
            Some(RESULT_OK) => Ok(env),
            Some(RESULT_TOKEN_EXPIRED) => {
                warn!("iSolarCloud token expired during {}; logging in again", endpoint);
                self.authenticate()?;
                self.attach_token(&mut payload)?;
                let retried = self.post(endpoint, &Value::Object(payload))?;
                match retried.result_code.as_deref() {
                    Some(RESULT_OK) => Ok(retried),
                    _ => Err(api_error(&retried)),
                }
            }
            _ => Err(api_error(&env)),
        }
    }

    fn attach_token(&self, payload: &mut Map<String, Value>) -> Result<(), ClientError> {
        let token = self.token.borrow().clone().ok_or(ClientError::NotAuthenticated)?;
        payload.insert("token".into(), Value::String(token));
        Ok(())
    }

    fn pause(&self) {
        if !self.request_delay.is_zero() {
            thread::sleep(self.request_delay);
        }
    }

    pub fn get_power_station_page(&self, page: u32, size: u32) -> Result<PageList<PowerStationRecord>, ClientError> {
        let mut payload = Map::new();
        payload.insert("curPage".into(), json!(page));
        payload.insert("size".into(), json!(size));
        let env = self.call(POWER_STATION_LIST_ENDPOINT, payload)?;
        decode(env.result_data)
    }

    pub fn get_device_page(&self, ps_id: i64, page: u32, size: u32) -> Result<PageList<DeviceRecord>, ClientError> {
        let mut payload = Map::new();
        payload.insert("ps_id".into(), json!(ps_id));
        payload.insert("curPage".into(), json!(page));
        payload.insert("size".into(), json!(size));
        let env = self.call(DEVICE_LIST_ENDPOINT, payload)?;
        decode(env.result_data)
    }

    /// Raw per-device record lists keyed by device key; rows are normalized by the caller.
    pub fn get_minute_data(&self, req: &MinuteDataRequest<'_>) -> Result<BTreeMap<String, Value>, ClientError> {
        let mut payload = Map::new();
        payload.insert("ps_key_list".into(), json!(req.ps_keys));
        payload.insert("points".into(), Value::String(req.points.join(",")));
        payload.insert("start_time_stamp".into(), Value::String(req.start_time_stamp.clone()));
        payload.insert("end_time_stamp".into(), Value::String(req.end_time_stamp.clone()));
        payload.insert("minute_interval".into(), json!(req.minute_interval));
        let env = self.call(MINUTE_DATA_ENDPOINT, payload)?;
        match env.result_data {
            Value::Null => Ok(BTreeMap::new()),
            other => decode(other),
        }
    }
}

fn api_error(env: &ApiEnvelope) -> ClientError {
    ClientError::Api {
        code: env.result_code.clone().unwrap_or_else(|| "-".to_string()),
        message: env.result_msg.clone().unwrap_or_else(|| "-".to_string()),
    }
}
