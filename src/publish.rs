use std::fmt;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::error::Error;
use crate::snapshot::Report;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the message bus's HTTP publish endpoint.
#[derive(Clone)]
pub struct PublishConfig {
    pub url: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Publishes vehicle reports to a RabbitMQ-style exchange over its HTTP
/// API. In dry-run mode messages are logged instead of sent.
pub struct Publisher {
    http: reqwest::Client,
    config: Option<PublishConfig>,
    dry_run: bool,
}

impl Publisher {
    pub fn new(config: Option<PublishConfig>, dry_run: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            dry_run,
        }
    }

    /// Wrap the report in the exchange-publish envelope and POST it.
    ///
    /// The payload rides as a JSON string so the consumer side sees one
    /// message body per vehicle regardless of exchange configuration.
    pub async fn publish(&self, vin: &str, report: &Report) -> Result<(), Error> {
        let routing_key = format!("vehicle.{vin}");
        let payload = serde_json::to_string(report)
            .map_err(|e| Error::Publish(format!("failed to serialize report: {e}")))?;
        let message = json!({
            "properties": {},
            "routing_key": routing_key,
            "payload": payload,
            "payload_encoding": "string",
        });

        if self.dry_run {
            info!(routing_key, "dry run, skipping publish");
            debug!(message = %message, "would publish");
            return Ok(());
        }

        let Some(config) = &self.config else {
            return Err(Error::Publish("no publish endpoint configured".into()));
        };

        let mut request = self.http.post(&config.url).timeout(PUBLISH_TIMEOUT);
        if !config.user.is_empty() {
            request = request.basic_auth(&config.user, Some(&config.password));
        }

        let resp = request
            .json(&message)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Publish(format!("status {status}: {body}")));
        }

        debug!(routing_key, "published");
        Ok(())
    }
}
