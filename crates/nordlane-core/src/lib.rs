// nordlane-core: Server selection pipeline and firewall lifecycle between
// nordlane-api and the CLI.

pub mod area;
pub mod convert;
pub mod criteria;
pub mod directory;
pub mod dns;
pub mod error;
pub mod filter;
pub mod firewall;
pub mod interfaces;
pub mod model;
pub mod pipeline;
pub mod probe;
pub mod profile;
pub mod rank;
pub mod select;
pub mod session;
pub mod streaming;
pub mod tunnel;

// ── Primary re-exports ──────────────────────────────────────────────
pub use area::{ApiGeocoder, AreaResolver, GeocodeSpacing, Geocoder};
pub use criteria::{CountryScope, SelectionCriteria, SelectionPolicy};
pub use directory::{Directory, DirectoryCache, DirectoryService};
pub use dns::{DnsOptions, DnsPatcher};
pub use error::CoreError;
pub use firewall::{
    AllowedPort, ArmPolicy, FirewallBackend, FirewallController, FirewallOp, IptablesBackend,
    MemoryBackend,
};
pub use pipeline::{SelectionPipeline, SelectionReport};
pub use probe::{LatencyProber, PingRunner, ProbeRunner};
pub use profile::{ConnectionProfile, ProfileStore};
pub use select::Selection;
pub use session::{ConnectPlan, ConnectionSession, SessionEnd, SessionOptions, SessionOutcome};
pub use tunnel::{OpenVpnDriver, TunnelDriver, TunnelExit, TunnelRequest};

pub use model::{
    Candidate, Category, Coordinates, Endpoint, FirewallState, InterfaceAddress, LatencySample,
    NetworkInterface, Protocol, ProtocolSupport, RankedServer,
};
