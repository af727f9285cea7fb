use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::error::truncate_body;
use crate::session::Session;
use crate::types::{
    celsius_to_deci, Device, DAMPER_POSITIONS, FAN_SPEED_MAX, HUMIDITY_STAGE_MAX,
    TARGET_TEMP_MAX_DECI_C, TARGET_TEMP_MIN_DECI_C,
};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.atmeex.ru";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// The backend conflates server errors with auth errors: besides 401 it
/// has been observed answering 403 and 500 to a stale token. Each gets
/// one session refresh and one retry, never more.
const AUTH_RETRY_STATUSES: [u16; 3] = [401, 403, 500];

pub struct AtmeexClientBuilder {
    email: String,
    password: String,
    base_url: String,
    timeout: Duration,
    damper_positions: u8,
}

impl AtmeexClientBuilder {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            damper_positions: DAMPER_POSITIONS,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of damper positions the fleet supports. Most firmware is
    /// 4-way (0..=3); some variants only accept the 3-way subset.
    pub fn damper_positions(mut self, count: u8) -> Self {
        self.damper_positions = count.clamp(1, DAMPER_POSITIONS);
        self
    }

    pub fn build(self) -> AtmeexClient {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .expect("failed to build HTTP client");

        AtmeexClient {
            http,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            session: Session::new(self.email, self.password),
            damper_positions: self.damper_positions,
        }
    }
}

/// Authenticated client for the Atmeex cloud. All methods take `&self`;
/// the session handles its own mutual exclusion, so one client can be
/// shared across the poller and concurrent write commands.
pub struct AtmeexClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
    damper_positions: u8,
}

impl AtmeexClient {
    pub fn builder(email: impl Into<String>, password: impl Into<String>) -> AtmeexClientBuilder {
        AtmeexClientBuilder::new(email, password)
    }

    /// Issues one authenticated call. On an authorization-class status the
    /// session is invalidated and the call retried exactly once with a
    /// fresh token; a second failure of the same class is terminal.
    ///
    /// The body is decoded as JSON regardless of the declared content
    /// type (the backend mislabels it); non-JSON text comes back as a
    /// JSON string so callers that need structure can reject it.
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut reauthed = false;
        loop {
            let token = self
                .session
                .ensure_authenticated(&self.http, &self.base_url)
                .await?;

            let url = format!("{}{}", self.base_url, path);
            trace!(method = %method, url = %url, "dispatching request");

            let mut req = self.http.request(method.clone(), &url).bearer_auth(&token);
            if let Some(b) = body {
                req = req.json(b);
            }

            let resp = req.send().await?;
            let status = resp.status().as_u16();
            let text = resp.text().await?;

            if (200..300).contains(&status) {
                return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
            }

            if AUTH_RETRY_STATUSES.contains(&status) && !reauthed {
                debug!(status, path, "authorization-class failure, refreshing session");
                self.session.invalidate().await;
                reauthed = true;
                continue;
            }

            return Err(Error::Api {
                status,
                body: truncate_body(&text),
            });
        }
    }

    /// Fetches the device directory, telemetry included.
    ///
    /// The primary request asks for embedded live telemetry. When the
    /// backend rejects that shape with a 5xx, the degraded path fetches
    /// the plain list and enriches each device from its detail endpoint;
    /// a device whose enrichment fails is kept with its partial record
    /// rather than dropped.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        match self.execute(Method::GET, "/devices?with_condition=1", None).await {
            Ok(v) => parse_device_list(v),
            Err(err) if err.is_server_error() => {
                warn!(error = %err, "telemetry device list rejected, using degraded path");
                self.list_devices_degraded().await
            }
            Err(err) => Err(err),
        }
    }

    async fn list_devices_degraded(&self) -> Result<Vec<Device>> {
        let v = self.execute(Method::GET, "/devices", None).await?;
        let mut devices = parse_device_list(v)?;

        for dev in devices.iter_mut() {
            match self.get_device(dev.id).await {
                Ok(detail) => *dev = detail,
                Err(err) => {
                    warn!(device_id = dev.id, error = %err, "enrichment failed, keeping partial record");
                }
            }
        }
        Ok(devices)
    }

    pub async fn get_device(&self, device_id: u64) -> Result<Device> {
        let v = self
            .execute(Method::GET, &format!("/devices/{device_id}"), None)
            .await?;
        serde_json::from_value(unwrap_data(v))
            .map_err(|e| Error::Protocol(format!("device record: {e}")))
    }

    // -- Write commands --
    //
    // All writes go through PUT /devices/{id}/params with the vendor field
    // names; responses are only checked for status. The caller is expected
    // to follow up with a poll or a targeted refresh to see the change.

    /// Writes a batch of raw settings fields for one device.
    pub async fn set_params(&self, device_id: u64, params: Value) -> Result<()> {
        self.execute(
            Method::PUT,
            &format!("/devices/{device_id}/params"),
            Some(&params),
        )
        .await?;
        Ok(())
    }

    pub async fn set_power(&self, device_id: u64, on: bool) -> Result<()> {
        self.set_params(device_id, json!({ "u_pwr_on": on })).await
    }

    pub async fn set_fan_speed(&self, device_id: u64, speed: u8) -> Result<()> {
        let speed = speed.min(FAN_SPEED_MAX);
        self.set_params(device_id, json!({ "u_fan_speed": speed })).await
    }

    pub async fn set_target_temperature(&self, device_id: u64, celsius: f64) -> Result<()> {
        let deci = celsius_to_deci(celsius).clamp(TARGET_TEMP_MIN_DECI_C, TARGET_TEMP_MAX_DECI_C);
        self.set_params(device_id, json!({ "u_temp_room": deci })).await
    }

    /// 0 = off, 1..=3 = humidification stages.
    pub async fn set_humidity_stage(&self, device_id: u64, stage: u8) -> Result<()> {
        let stage = stage.min(HUMIDITY_STAGE_MAX);
        self.set_params(device_id, json!({ "u_hum_stg": stage })).await
    }

    /// Damper position selects the brizer mode (fresh air, recirculation,
    /// mixed, valve-only). Clamped to the configured position count.
    pub async fn set_damper_mode(&self, device_id: u64, position: u8) -> Result<()> {
        let position = position.min(self.damper_positions - 1);
        self.set_params(device_id, json!({ "u_damp_pos": position })).await
    }
}

/// The list endpoint answers either a bare JSON array or an object
/// wrapping the array under `data`, depending on backend dialect.
fn parse_device_list(body: Value) -> Result<Vec<Device>> {
    let entries = match unwrap_data(body) {
        Value::Array(entries) => entries,
        other => {
            return Err(Error::Protocol(format!(
                "device list is not an array: {}",
                truncate_body(&other.to_string())
            )));
        }
    };

    let mut devices = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<Device>(entry) {
            Ok(dev) => devices.push(dev),
            Err(e) => warn!(error = %e, "skipping unparseable device record"),
        }
    }
    Ok(devices)
}

fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
