// Server directory client
//
// Read-only client for the provider's public server list. One endpoint,
// `GET {base}/server`, returning a flat JSON array of server records.

pub mod client;
pub mod models;

pub use client::DirectoryClient;
pub use models::{Category, Features, Location, ServerRecord};
