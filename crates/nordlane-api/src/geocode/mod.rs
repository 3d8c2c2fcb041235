// Reverse geocoding client
//
// Thin client for a Nominatim-compatible `/reverse` endpoint. Used to turn
// server coordinates into locality names for area filtering.

pub mod client;
pub mod models;

pub use client::GeocodeClient;
pub use models::{Address, ReverseResponse};
