use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::auth::session::Session;
use crate::error::Error;
use crate::geo::Geofence;
use crate::publish::Publisher;
use crate::snapshot::{ErrorReport, Report, VehicleSnapshot};

/// Drives the fleet monitoring cycle: per vehicle, assemble a report and
/// hand it to the publisher.
pub struct Poller {
    api: ApiClient,
    session: Arc<Session>,
    publisher: Publisher,
    vins: Vec<String>,
    home: Option<Geofence>,
}

impl Poller {
    pub fn new(
        api: ApiClient,
        session: Arc<Session>,
        publisher: Publisher,
        vins: Vec<String>,
        home: Option<Geofence>,
    ) -> Self {
        Self {
            api,
            session,
            publisher,
            vins,
            home,
        }
    }

    /// One cycle over the fleet.
    ///
    /// `Ok(true)` when every vehicle's report was published, `Ok(false)` on
    /// transient trouble worth retrying, `Err` when the session needs a new
    /// authorization flow. Error records are still published so the bus
    /// sees every cycle.
    pub async fn run_once(&self) -> Result<bool, Error> {
        info!(vehicles = self.vins.len(), "starting monitoring cycle");

        if let Err(auth_err) = self.session.access_token().await {
            error!(error = %auth_err, "authentication required before polling");
            for vin in &self.vins {
                let report = Report::Error(ErrorReport::new(
                    vin,
                    "authentication_required",
                    format!("No valid authentication: {auth_err}. Run `fleetbeat auth`."),
                    Utc::now(),
                ));
                if let Err(e) = self.publisher.publish(vin, &report).await {
                    warn!(vin, error = %e, "failed to publish auth-required record");
                }
            }
            return Err(auth_err.into());
        }

        let mut all_published = true;
        for vin in &self.vins {
            let report = self.collect(vin).await;
            match self.publisher.publish(report.vin(), &report).await {
                Ok(()) => match &report {
                    Report::Telemetry(snapshot) => info!(
                        vin,
                        battery = ?snapshot.battery_level,
                        charging = ?snapshot.charging_status,
                        source = ?snapshot.source,
                        "vehicle report published"
                    ),
                    Report::Error(record) => {
                        warn!(vin, error = %record.error, "published error record")
                    }
                },
                Err(e) => {
                    error!(vin, error = %e, "publish failed");
                    all_published = false;
                }
            }
        }

        info!("monitoring cycle complete");
        Ok(all_published)
    }

    /// Assemble the report for one vehicle. API failures degrade to error
    /// records rather than aborting the cycle.
    async fn collect(&self, vin: &str) -> Report {
        let now = Utc::now();
        let mut snapshot = VehicleSnapshot::new(vin, now);

        let mut have_battery = false;
        match self.api.energy_state(vin).await {
            Ok(energy) => {
                have_battery = snapshot.apply_energy(&energy);
            }
            Err(e) => {
                warn!(vin, error = %e, "energy API unavailable, trying fuel status");
            }
        }

        if !have_battery {
            match self.api.fuel_status(vin).await {
                Ok(fuel) => {
                    if !snapshot.apply_fuel(&fuel, now) {
                        return Report::Error(ErrorReport::new(
                            vin,
                            "no_battery_data",
                            "No battery information available in fuel status",
                            now,
                        ));
                    }
                }
                Err(e) => {
                    return Report::Error(ErrorReport::new(
                        vin,
                        "api_failure",
                        format!("All battery endpoints failed: {e}"),
                        now,
                    ));
                }
            }
        }

        match self.api.location(vin).await {
            Ok(location) => snapshot.set_location(&location, self.home.as_ref()),
            Err(e) => {
                debug!(vin, error = %e, "location unavailable");
                snapshot.location_error(e.to_string());
            }
        }

        snapshot.fill_charging_defaults();
        Report::Telemetry(snapshot)
    }

    /// Poll until stopped. Transient failures keep the loop alive; a
    /// session that needs re-authorization ends it.
    pub async fn run_loop(&self, interval: Duration) -> Result<(), Error> {
        info!(interval_secs = interval.as_secs(), "starting continuous monitoring");
        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => warn!("cycle completed with failures; retrying next interval"),
                Err(e) if e.requires_reauth() => {
                    error!(error = %e, "re-authorization required, stopping");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "cycle failed; retrying next interval"),
            }
            debug!("sleeping until next cycle");
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::Credentials;
    use crate::auth::store::TokenStore;
    use crate::auth::token::TokenSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_with_token(dir: &tempfile::TempDir) -> Arc<Session> {
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store
            .save(&TokenSet {
                access_token: Some("A".into()),
                refresh_token: None,
                expires_at: None,
            })
            .unwrap();
        Arc::new(Session::new(
            Credentials {
                client_id: "client".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://localhost:4430/callback".into(),
                scopes: vec![],
                use_pkce: true,
                auth_base_url: "http://127.0.0.1:1".into(),
            },
            store,
        ))
    }

    fn poller_for(session: Arc<Session>, api_base: &str, vins: Vec<String>) -> Poller {
        let api = ApiClient::new(session.clone(), "key".into(), api_base.into());
        Poller::new(api, session, Publisher::new(None, true), vins, None)
    }

    #[tokio::test]
    async fn cycle_succeeds_with_energy_and_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/energy/v2/vehicles/VIN1/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "batteryChargeLevel": {"status": "OK", "value": 80, "unit": "%"},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/location/v1/vehicles/VIN1/location"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "geometry": {"coordinates": [5.17, 52.21]},
                    "properties": {"heading": "12", "timestamp": "2026-03-01T11:59:00Z"},
                }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let session = session_with_token(&dir);
        let poller = poller_for(session, &server.uri(), vec!["VIN1".into()]);
        assert!(poller.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn unauthenticated_cycle_is_a_reauth_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("absent.json"));
        let session = Arc::new(Session::new(
            Credentials {
                client_id: "client".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://localhost:4430/callback".into(),
                scopes: vec![],
                use_pkce: true,
                auth_base_url: "http://127.0.0.1:1".into(),
            },
            store,
        ));
        let poller = poller_for(session, "http://127.0.0.1:1", vec!["VIN1".into()]);

        let err = poller.run_once().await.unwrap_err();
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn battery_endpoints_all_failing_degrade_to_error_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/energy/v2/vehicles/VIN1/state"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/connected-vehicle/v2/vehicles/VIN1/fuel"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let session = session_with_token(&dir);
        let poller = poller_for(session, &server.uri(), vec!["VIN1".into()]);

        let report = poller.collect("VIN1").await;
        match report {
            Report::Error(record) => assert_eq!(record.error, "api_failure"),
            other => panic!("expected error record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fuel_fallback_feeds_the_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/energy/v2/vehicles/VIN1/state"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/connected-vehicle/v2/vehicles/VIN1/fuel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"batteryChargeLevel": {"value": 41, "unit": "%"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/location/v1/vehicles/VIN1/location"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let session = session_with_token(&dir);
        let poller = poller_for(session, &server.uri(), vec!["VIN1".into()]);

        match poller.collect("VIN1").await {
            Report::Telemetry(snapshot) => {
                assert_eq!(snapshot.battery_level, Some(serde_json::json!(41)));
                assert_eq!(snapshot.source.as_deref(), Some("fuel_status_api"));
                // Near-empty battery with unknown charging state.
                assert_eq!(snapshot.charging_status, Some(serde_json::json!("UNKNOWN")));
            }
            other => panic!("expected telemetry, got {other:?}"),
        }
    }
}
