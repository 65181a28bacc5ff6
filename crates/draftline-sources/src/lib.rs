pub mod auth;
pub mod espn;
pub mod provider;
pub mod sleeper;
pub mod testutil;
pub mod transport;
pub mod yahoo;

pub use auth::{AuthProvider, OAuthConfig, OAuthRefreshAuth, PublicAuth, StaticHeaderAuth};
pub use espn::EspnSource;
pub use provider::ProviderCore;
pub use sleeper::SleeperSource;
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use yahoo::{YAHOO_TOKEN_URL, YahooSource};
