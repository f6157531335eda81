use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::auth::session::Session;
use crate::error::Error;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// One reported data point from the telemetry API. Fields the vehicle does
/// not support simply stay absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub status: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    #[serde(alias = "timestamp")]
    pub updated_at: Option<String>,
}

impl Observation {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("OK")
    }
}

/// Energy API v2 state. The endpoint returns these fields at the top level,
/// not wrapped in a `data` envelope like the connected-vehicle endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnergyState {
    pub battery_charge_level: Option<Observation>,
    pub charging_status: Option<Observation>,
    pub charging_current_limit: Option<Observation>,
    pub charging_power: Option<Observation>,
    pub charger_connection_status: Option<Observation>,
    pub charging_type: Option<Observation>,
}

/// Fallback battery reading from the connected-vehicle fuel endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuelStatus {
    pub battery_charge_level: Option<Observation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VehicleLocation {
    pub geometry: Option<Geometry>,
    pub properties: Option<LocationProperties>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geometry {
    /// GeoJSON order: longitude first, then latitude.
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationProperties {
    pub heading: Option<Value>,
    pub speed: Option<Value>,
    pub timestamp: Option<String>,
}

/// Thin REST client over the telemetry API.
///
/// Every request goes through the session for a usable bearer token and
/// carries the portal API key; response statuses map onto the error
/// taxonomy so callers never see raw transport errors.
pub struct ApiClient {
    http: reqwest::Client,
    session: Arc<Session>,
    api_key: String,
    base_url: String,
}

impl ApiClient {
    pub fn new(session: Arc<Session>, api_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            session,
            api_key,
            base_url,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, Error> {
        let token = self.session.access_token().await?;
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("vcc-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        match status {
            401 | 403 => Err(Error::Unauthorized { status }),
            404 => Err(Error::VehicleNotFound),
            429 => Err(Error::RateLimited),
            s if s >= 400 => {
                let message = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                    .unwrap_or_else(|| "Unknown error".to_string());
                Err(Error::Api { status: s, message })
            }
            _ => resp
                .json()
                .await
                .map_err(|e| Error::Transport(format!("invalid JSON response: {e}"))),
        }
    }

    /// VINs of the vehicles tied to the authenticated account.
    pub async fn vehicles(&self) -> Result<Vec<String>, Error> {
        let body = self.get_json("/connected-vehicle/v2/vehicles").await?;
        let vins = body
            .get("data")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.get("vin").and_then(Value::as_str).map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(vins)
    }

    pub async fn energy_state(&self, vin: &str) -> Result<EnergyState, Error> {
        let body = self.get_json(&format!("/energy/v2/vehicles/{vin}/state")).await?;
        serde_json::from_value(body)
            .map_err(|e| Error::Transport(format!("invalid energy state: {e}")))
    }

    pub async fn fuel_status(&self, vin: &str) -> Result<FuelStatus, Error> {
        let body = self
            .get_json(&format!("/connected-vehicle/v2/vehicles/{vin}/fuel"))
            .await?;
        let data = body
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(data)
            .map_err(|e| Error::Transport(format!("invalid fuel status: {e}")))
    }

    pub async fn location(&self, vin: &str) -> Result<VehicleLocation, Error> {
        let body = self
            .get_json(&format!("/location/v1/vehicles/{vin}/location"))
            .await?;
        let data = body
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(data)
            .map_err(|e| Error::Transport(format!("invalid location: {e}")))
    }

    pub async fn odometer(&self, vin: &str) -> Result<Value, Error> {
        let body = self
            .get_json(&format!("/connected-vehicle/v2/vehicles/{vin}/odometer"))
            .await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}
