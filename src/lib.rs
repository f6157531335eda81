pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
pub mod poller;
pub mod publish;
pub mod snapshot;

pub use api::ApiClient;
pub use auth::{Clock, Credentials, Session, SystemClock, TokenSet, TokenStore};
pub use config::Config;
pub use error::{AuthError, Error};
pub use geo::Geofence;
pub use poller::Poller;
pub use publish::{PublishConfig, Publisher};
pub use snapshot::{Report, VehicleSnapshot};
