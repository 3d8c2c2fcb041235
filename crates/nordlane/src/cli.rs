//! Clap derive structures for the `nordlane` CLI.
//!
//! Compiled twice: once into the binary and once by `build.rs` for man
//! pages, so it may only depend on clap, clap_complete and std.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nordlane -- pick the best NordVPN server and connect behind a kill switch
#[derive(Debug, Parser)]
#[command(
    name = "nordlane",
    version,
    about = "Pick the best NordVPN server and connect to it",
    long_about = "Queries the NordVPN server directory, filters by category and geography,\n\
        ranks by load and measured latency, then runs OpenVPN against the winner\n\
        with an iptables kill switch around the tunnel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "NORDLANE_CONFIG", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NORDLANE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select a server and run the tunnel
    #[command(alias = "c")]
    Connect(ConnectArgs),

    /// List servers matching a country, area or category
    #[command(alias = "ls")]
    List(ListArgs),

    /// List every country in the server directory
    Countries,

    /// Stop running tunnels, optionally flushing the firewall
    Kill(KillArgs),

    /// Inspect or reset the kill-switch firewall
    #[command(alias = "fw")]
    Firewall(FirewallArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Server category. At most one may be given.
#[derive(Debug, Default, Args)]
#[group(multiple = false)]
pub struct CategoryArgs {
    /// Peer-to-peer servers
    #[arg(long)]
    pub p2p: bool,

    /// Dedicated IP servers
    #[arg(long)]
    pub dedicated: bool,

    /// Double VPN servers
    #[arg(long)]
    pub double_vpn: bool,

    /// Onion over VPN servers
    #[arg(long)]
    pub tor: bool,

    /// Obfuscated servers
    #[arg(long)]
    pub obfuscated: bool,

    /// Streaming-optimized servers
    #[arg(long)]
    pub streaming: bool,
}

/// Where to look for servers.
#[derive(Debug, Default, Args)]
pub struct PlaceArgs {
    /// Two-letter country code, full country name, or "all"
    pub country: Option<String>,

    /// Restrict to a locality (city or region) inside the country
    #[arg(long, short = 'a', conflicts_with = "location")]
    pub area: Option<String>,

    /// Restrict to servers at exactly these coordinates
    #[arg(
        long,
        num_args = 2,
        value_names = ["LAT", "LON"],
        allow_negative_numbers = true
    )]
    pub location: Option<Vec<f64>>,

    /// Use TCP profiles instead of UDP
    #[arg(long)]
    pub tcp: bool,

    #[command(flatten)]
    pub category: CategoryArgs,
}

#[derive(Debug, Default, Args)]
pub struct RankArgs {
    /// Drop servers at or above this load percentage
    #[arg(long, short = 'm')]
    pub max_load: Option<u8>,

    /// Drop servers below this load percentage
    #[arg(long)]
    pub load_floor: Option<u8>,

    /// Number of least-loaded servers to probe
    #[arg(long, short = 't')]
    pub top_servers: Option<usize>,

    /// Size of the latency-ranked pool to pick from
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Echo requests per latency probe
    #[arg(long)]
    pub pings: Option<u32>,

    /// Always take the lowest-latency server instead of a random pool member
    #[arg(long)]
    pub best: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Local access
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Args)]
pub struct LocalAccessArgs {
    /// TCP ports reachable from the local subnet while armed
    #[arg(long, num_args = 1.., value_name = "PORT")]
    pub allow: Vec<u16>,

    /// Allow every port from the local subnet
    #[arg(long)]
    pub allow_locally: bool,

    /// JSON file describing allowed ports
    #[arg(long, value_name = "FILE", conflicts_with = "allow_config_json")]
    pub allow_config: Option<PathBuf>,

    /// Inline JSON describing allowed ports
    #[arg(long, value_name = "JSON")]
    pub allow_config_json: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub place: PlaceArgs,

    #[command(flatten)]
    pub rank: RankArgs,

    /// Connect to this server (e.g. au10), skipping selection
    #[arg(long, short = 's', conflicts_with_all = ["country", "area", "location"])]
    pub server: Option<String>,

    /// Select a server and report it without touching the network
    #[arg(long)]
    pub test: bool,

    /// Arm the kill-switch firewall around the tunnel
    #[arg(long, short = 'f')]
    pub kill_switch: bool,

    /// Leave DNS configuration alone
    #[arg(long)]
    pub skip_dns_patch: bool,

    /// Do not pass --redirect-gateway to OpenVPN
    #[arg(long)]
    pub no_redirect_gateway: bool,

    /// Extra OpenVPN options, passed through verbatim
    #[arg(long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub openvpn_options: Option<String>,

    /// OpenVPN --auth-user-pass file
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    #[command(flatten)]
    pub access: LocalAccessArgs,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  List
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub place: PlaceArgs,

    /// Resolve and show the locality of every listed server
    #[arg(long)]
    pub areas: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Kill
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct KillArgs {
    /// Also flush the firewall and re-enable IPv6
    #[arg(long)]
    pub flush: bool,

    #[command(flatten)]
    pub access: LocalAccessArgs,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Firewall
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct FirewallArgs {
    #[command(subcommand)]
    pub command: FirewallCommand,
}

#[derive(Debug, Subcommand)]
pub enum FirewallCommand {
    /// Show the rules arming for a server would apply
    Plan {
        /// Server identifier (e.g. se42)
        server: String,

        /// Use the TCP profile
        #[arg(long)]
        tcp: bool,

        #[command(flatten)]
        access: LocalAccessArgs,
    },

    /// Reset to accept-all and re-enable IPv6
    Clear,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Set a configuration value (e.g. selection.max_load 50)
    Set {
        /// Dotted key: section.field
        key: String,
        /// New value
        value: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
