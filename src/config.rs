use std::fmt;
use std::path::PathBuf;

use crate::auth::session::Credentials;
use crate::error::Error;
use crate::geo::Geofence;
use crate::publish::PublishConfig;

pub const DEFAULT_AUTH_BASE_URL: &str = "https://volvoid.eu.volvocars.com";
pub const DEFAULT_API_BASE_URL: &str = "https://api.volvocars.com";

const DEFAULT_TOKEN_FILE: &str = "tokens.json";
const DEFAULT_HOME_RADIUS_M: f64 = 100.0;

pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "conve:battery_charge_level",
    "conve:commands",
    "conve:brake_status",
    "conve:diagnostics_engine_status",
    "conve:fuel_status",
    "conve:vehicle_relation",
    "conve:warnings",
    "energy:state:read",
    "energy:capability:read",
    "location:read",
];

pub const BASIC_SCOPES: &[&str] = &[
    "openid",
    "conve:vehicle_relation",
    "conve:fuel_status",
    "conve:battery_charge_level",
    "energy:state:read",
];

pub const COMMAND_SCOPES: &[&str] = &["openid", "conve:commands", "conve:vehicle_relation"];

pub const ALL_SCOPES: &[&str] = &[
    "openid",
    "conve:battery_charge_level",
    "conve:commands",
    "conve:brake_status",
    "conve:diagnostics_engine_status",
    "conve:fuel_status",
    "conve:vehicle_relation",
    "conve:warnings",
    "conve:climatization_start_stop",
    "conve:engine_start_stop",
    "conve:honk_blink",
    "conve:lock_unlock",
    "conve:preclimatization",
    "conve:trip_statistics",
    "energy:state:read",
    "energy:capability:read",
    "location:read",
];

/// Resolve a scope preset by name; unknown names fall back to the default
/// set.
pub fn scopes_for(category: &str) -> Vec<String> {
    let preset = match category.to_ascii_lowercase().as_str() {
        "basic" => BASIC_SCOPES,
        "command" => COMMAND_SCOPES,
        "all" => ALL_SCOPES,
        _ => DEFAULT_SCOPES,
    };
    preset.iter().map(|s| s.to_string()).collect()
}

const REQUIRED_VARS: &[&str] = &[
    "FLEETBEAT_CLIENT_ID",
    "FLEETBEAT_CLIENT_SECRET",
    "FLEETBEAT_REDIRECT_URI",
    "FLEETBEAT_API_KEY",
];

/// Names of required variables that are absent (or empty) in the given
/// lookup.
pub fn missing_required<F>(get: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_VARS
        .iter()
        .copied()
        .filter(|name| get(name).map_or(true, |v| v.is_empty()))
        .collect()
}

#[derive(Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_key: String,
    pub auth_base_url: String,
    pub api_base_url: String,
    pub token_file: PathBuf,
    pub scopes: Vec<String>,
    pub use_pkce: bool,
    pub vins: Vec<String>,
    pub home: Option<Geofence>,
    pub publish: Option<PublishConfig>,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = missing_required(&get);
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let var = |name: &str| get(name).filter(|v| !v.is_empty());

        let home = match (
            parse_f64("FLEETBEAT_HOME_LAT", var("FLEETBEAT_HOME_LAT"))?,
            parse_f64("FLEETBEAT_HOME_LON", var("FLEETBEAT_HOME_LON"))?,
        ) {
            (Some(latitude), Some(longitude)) => Some(Geofence {
                latitude,
                longitude,
                radius_m: parse_f64("FLEETBEAT_HOME_RADIUS_M", var("FLEETBEAT_HOME_RADIUS_M"))?
                    .unwrap_or(DEFAULT_HOME_RADIUS_M),
            }),
            _ => None,
        };

        let publish = var("FLEETBEAT_PUBLISH_URL").map(|url| PublishConfig {
            url,
            user: var("FLEETBEAT_PUBLISH_USER").unwrap_or_default(),
            password: var("FLEETBEAT_PUBLISH_PASS").unwrap_or_default(),
        });

        Ok(Self {
            client_id: var("FLEETBEAT_CLIENT_ID").unwrap_or_default(),
            client_secret: var("FLEETBEAT_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: var("FLEETBEAT_REDIRECT_URI").unwrap_or_default(),
            api_key: var("FLEETBEAT_API_KEY").unwrap_or_default(),
            auth_base_url: var("FLEETBEAT_AUTH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string()),
            api_base_url: var("FLEETBEAT_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            token_file: PathBuf::from(
                var("FLEETBEAT_TOKEN_FILE").unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string()),
            ),
            scopes: scopes_for(&var("FLEETBEAT_SCOPES").unwrap_or_default()),
            use_pkce: var("FLEETBEAT_USE_PKCE").map_or(true, |v| parse_bool(&v)),
            vins: var("FLEETBEAT_VINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            home,
            publish,
        })
    }

    /// Client identity handed to the session for its lifetime.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            use_pkce: self.use_pkce,
            auth_base_url: self.auth_base_url.clone(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("api_key", &"***")
            .field("auth_base_url", &self.auth_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("token_file", &self.token_file)
            .field("scopes", &self.scopes)
            .field("use_pkce", &self.use_pkce)
            .field("vins", &self.vins)
            .field("home", &self.home)
            .field("publish", &self.publish)
            .finish()
    }
}

fn parse_f64(name: &str, value: Option<String>) -> Result<Option<f64>, Error> {
    value
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| Error::Config(format!("{name} is not a number: {v}")))
        })
        .transpose()
}

fn parse_bool(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("FLEETBEAT_CLIENT_ID", "client"),
            ("FLEETBEAT_CLIENT_SECRET", "secret"),
            ("FLEETBEAT_REDIRECT_URI", "https://localhost:4430/callback"),
            ("FLEETBEAT_API_KEY", "key"),
        ])
    }

    fn lookup(env: &HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + '_ {
        move |name| env.get(name).map(|v| v.to_string())
    }

    #[test]
    fn missing_required_lists_exactly_the_absent_vars() {
        let mut env = base_env();
        env.remove("FLEETBEAT_CLIENT_SECRET");
        env.insert("FLEETBEAT_API_KEY", "");

        let missing = missing_required(lookup(&env));
        assert_eq!(missing, vec!["FLEETBEAT_CLIENT_SECRET", "FLEETBEAT_API_KEY"]);
    }

    #[test]
    fn from_lookup_reports_missing_vars() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        let msg = err.to_string();
        for name in REQUIRED_VARS {
            assert!(msg.contains(name), "{msg} should mention {name}");
        }
    }

    #[test]
    fn defaults_applied() {
        let config = Config::from_lookup(lookup(&base_env())).unwrap();
        assert_eq!(config.auth_base_url, DEFAULT_AUTH_BASE_URL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.token_file, PathBuf::from("tokens.json"));
        assert!(config.use_pkce);
        assert!(config.vins.is_empty());
        assert!(config.home.is_none());
        assert!(config.publish.is_none());
        assert_eq!(config.scopes.len(), DEFAULT_SCOPES.len());
    }

    #[test]
    fn vins_parsed_from_comma_list() {
        let mut env = base_env();
        env.insert("FLEETBEAT_VINS", " VIN1, VIN2 ,,VIN3 ");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.vins, vec!["VIN1", "VIN2", "VIN3"]);
    }

    #[test]
    fn geofence_needs_both_coordinates() {
        let mut env = base_env();
        env.insert("FLEETBEAT_HOME_LAT", "52.2139");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert!(config.home.is_none());

        env.insert("FLEETBEAT_HOME_LON", "5.1798");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        let home = config.home.unwrap();
        assert_eq!(home.radius_m, DEFAULT_HOME_RADIUS_M);

        env.insert("FLEETBEAT_HOME_RADIUS_M", "250");
        let home = Config::from_lookup(lookup(&env)).unwrap().home.unwrap();
        assert_eq!(home.radius_m, 250.0);
    }

    #[test]
    fn bad_coordinate_is_a_config_error() {
        let mut env = base_env();
        env.insert("FLEETBEAT_HOME_LAT", "north-a-bit");
        env.insert("FLEETBEAT_HOME_LON", "5.1798");
        let err = Config::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("FLEETBEAT_HOME_LAT"));
    }

    #[test]
    fn scope_presets() {
        assert_eq!(scopes_for("basic").len(), BASIC_SCOPES.len());
        assert_eq!(scopes_for("command"), COMMAND_SCOPES.to_vec());
        assert_eq!(scopes_for("ALL").len(), ALL_SCOPES.len());
        assert_eq!(scopes_for("unknown"), scopes_for("default"));
    }

    #[test]
    fn pkce_can_be_disabled() {
        let mut env = base_env();
        env.insert("FLEETBEAT_USE_PKCE", "false");
        assert!(!Config::from_lookup(lookup(&env)).unwrap().use_pkce);

        env.insert("FLEETBEAT_USE_PKCE", "1");
        assert!(Config::from_lookup(lookup(&env)).unwrap().use_pkce);
    }

    #[test]
    fn publish_config_from_url() {
        let mut env = base_env();
        env.insert("FLEETBEAT_PUBLISH_URL", "http://bus.local:15672/api/exchanges/v/x/publish");
        env.insert("FLEETBEAT_PUBLISH_USER", "svc");
        env.insert("FLEETBEAT_PUBLISH_PASS", "pw");
        let publish = Config::from_lookup(lookup(&env)).unwrap().publish.unwrap();
        assert_eq!(publish.user, "svc");
        assert_eq!(publish.password, "pw");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut env = base_env();
        env.insert("FLEETBEAT_CLIENT_SECRET", "hunter2");
        env.insert("FLEETBEAT_API_KEY", "apikey99");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("***"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("apikey99"));
    }
}
