// nordlane-api: Async Rust clients for the NordVPN server directory and
// the Nominatim reverse geocoder.

pub mod directory;
pub mod error;
pub mod geocode;
pub mod transport;

pub use directory::DirectoryClient;
pub use error::Error;
pub use geocode::GeocodeClient;
pub use transport::TransportConfig;
