// ── Domain model ──
//
// Canonical representation of directory endpoints, probed candidates, and
// the host network facts the firewall controller consumes. Everything here
// is plain data; behaviour lives in the pipeline and firewall modules.

pub mod candidate;
pub mod endpoint;
pub mod firewall;

// ── Re-exports ──────────────────────────────────────────────────────

pub use candidate::{Candidate, LatencySample};
pub use endpoint::{Category, Coordinates, Endpoint, Protocol, ProtocolSupport, RankedServer};
pub use firewall::{FirewallState, InterfaceAddress, NetworkInterface};
