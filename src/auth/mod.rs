pub mod authorize;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;

pub use authorize::parse_callback;
pub use pkce::PkcePair;
pub use session::{Clock, Credentials, Session, SystemClock};
pub use store::TokenStore;
pub use token::TokenSet;
