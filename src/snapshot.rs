use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::api::{EnergyState, FuelStatus, VehicleLocation};
use crate::geo::Geofence;

/// What a polling cycle publishes for one vehicle: either a telemetry
/// snapshot or an error record, so the bus receives something either way.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Report {
    Telemetry(VehicleSnapshot),
    Error(ErrorReport),
}

impl Report {
    pub fn vin(&self) -> &str {
        match self {
            Report::Telemetry(snapshot) => &snapshot.vin,
            Report::Error(error) => &error.vin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub message: String,
    pub vin: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(
        vin: &str,
        error: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            vin: vin.to_string(),
            timestamp: now,
        }
    }
}

/// Battery, charging, and location state for one vehicle at one instant.
#[derive(Debug, Serialize)]
pub struct VehicleSnapshot {
    pub vin: String,
    pub timestamp: DateTime<Utc>,
    pub battery_level: Option<Value>,
    pub unit: String,
    pub updated_at: Option<String>,
    pub charging_status: Option<Value>,
    pub charging_current: Option<Value>,
    pub charging_power: Option<Value>,
    pub charger_connected: Option<Value>,
    pub charging_type: Option<Value>,
    pub charging_limit: Option<Value>,
    pub source: Option<String>,
    pub location: LocationReport,
}

/// Either raw coordinates, or the collapsed "home" form when the vehicle
/// sits inside the configured geofence.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LocationReport {
    Home {
        location: &'static str,
        distance_from_home: f64,
        heading: Option<Value>,
        updated_at: Option<String>,
        status: &'static str,
    },
    Coordinates {
        latitude: Option<f64>,
        longitude: Option<f64>,
        heading: Option<Value>,
        speed: Option<Value>,
        updated_at: Option<String>,
        status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl LocationReport {
    fn empty(status: Option<String>) -> Self {
        LocationReport::Coordinates {
            latitude: None,
            longitude: None,
            heading: None,
            speed: None,
            updated_at: None,
            status,
            error: None,
        }
    }
}

impl VehicleSnapshot {
    pub fn new(vin: &str, now: DateTime<Utc>) -> Self {
        Self {
            vin: vin.to_string(),
            timestamp: now,
            battery_level: None,
            unit: "%".to_string(),
            updated_at: None,
            charging_status: None,
            charging_current: None,
            charging_power: None,
            charger_connected: None,
            charging_type: None,
            charging_limit: None,
            source: None,
            location: LocationReport::empty(None),
        }
    }

    /// Copy in Energy API fields. Returns whether a usable battery reading
    /// was present.
    pub fn apply_energy(&mut self, energy: &EnergyState) -> bool {
        let mut have_battery = false;

        if let Some(battery) = energy.battery_charge_level.as_ref().filter(|o| o.is_ok()) {
            self.battery_level = battery.value.clone();
            self.updated_at = battery.updated_at.clone();
            if let Some(unit) = &battery.unit {
                self.unit = unit.clone();
            }
            self.source = Some("energy_api_v2".to_string());
            have_battery = true;
        }
        if let Some(status) = energy.charging_status.as_ref().filter(|o| o.is_ok()) {
            self.charging_status = status.value.clone();
        }
        if let Some(current) = energy.charging_current_limit.as_ref().filter(|o| o.is_ok()) {
            self.charging_current = current.value.clone();
            self.charging_limit = current.value.clone();
        }
        if let Some(power) = energy.charging_power.as_ref().filter(|o| o.is_ok()) {
            self.charging_power = power.value.clone();
        }
        if let Some(connection) = energy
            .charger_connection_status
            .as_ref()
            .filter(|o| o.is_ok())
        {
            self.charger_connected = connection.value.clone();
        }
        if let Some(kind) = energy.charging_type.as_ref().filter(|o| o.is_ok()) {
            self.charging_type = kind.value.clone();
        }

        have_battery
    }

    /// Fallback battery reading from the fuel endpoint. Returns whether a
    /// value was present.
    pub fn apply_fuel(&mut self, fuel: &FuelStatus, now: DateTime<Utc>) -> bool {
        let Some(battery) = fuel
            .battery_charge_level
            .as_ref()
            .filter(|o| o.value.is_some())
        else {
            return false;
        };
        self.battery_level = battery.value.clone();
        self.updated_at = battery
            .updated_at
            .clone()
            .or_else(|| Some(now.to_rfc3339()));
        if let Some(unit) = &battery.unit {
            self.unit = unit.clone();
        }
        self.source = Some("fuel_status_api".to_string());
        true
    }

    /// Fill charging fields the APIs left empty. A near-full battery with
    /// unknown charging state reads as idle.
    pub fn fill_charging_defaults(&mut self) {
        if self.charging_status.is_none() {
            if let Some(level) = self.battery_level.as_ref().and_then(Value::as_f64) {
                let inferred = if level >= 95.0 { "IDLE" } else { "UNKNOWN" };
                self.charging_status = Some(Value::from(inferred));
            }
        }
        if self.charging_current.is_none() {
            self.charging_current = Some(Value::from("N/A"));
        }
        if self.charging_power.is_none() {
            self.charging_power = Some(Value::from("N/A"));
        }
        if self.charger_connected.is_none() {
            self.charger_connected = Some(Value::from("UNKNOWN"));
        }
        if self.charging_type.is_none() {
            self.charging_type = Some(Value::from("N/A"));
        }
    }

    pub fn set_location(&mut self, location: &VehicleLocation, home: Option<&Geofence>) {
        let (longitude, latitude) = match location.geometry.as_ref().map(|g| &g.coordinates) {
            Some(coords) if coords.len() >= 2 => (Some(coords[0]), Some(coords[1])),
            _ => (None, None),
        };

        let Some(props) = location.properties.as_ref() else {
            self.location = LocationReport::empty(Some("NO_DATA".to_string()));
            return;
        };

        if let (Some(lat), Some(lon), Some(home)) = (latitude, longitude, home) {
            if home.contains(lat, lon) {
                let distance = (home.distance_to(lat, lon) * 10.0).round() / 10.0;
                self.location = LocationReport::Home {
                    location: "home",
                    distance_from_home: distance,
                    heading: props.heading.clone(),
                    updated_at: props.timestamp.clone(),
                    status: "OK",
                };
                return;
            }
        }

        self.location = LocationReport::Coordinates {
            latitude,
            longitude,
            heading: props.heading.clone(),
            speed: props.speed.clone(),
            updated_at: props.timestamp.clone(),
            status: Some("OK".to_string()),
            error: None,
        };
    }

    pub fn location_error(&mut self, message: String) {
        self.location = LocationReport::Coordinates {
            latitude: None,
            longitude: None,
            heading: None,
            speed: None,
            updated_at: None,
            status: Some("ERROR".to_string()),
            error: Some(message),
        };
    }
}
