//! Command dispatch: bridges CLI args -> core pipeline/session -> output.

pub mod config_cmd;
pub mod connect;
pub mod countries;
pub mod firewall;
pub mod kill;
pub mod list;
pub mod util;

use tokio_util::sync::CancellationToken;

use nordlane_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs the loaded configuration.
pub async fn dispatch(
    cmd: Command,
    cfg: &Config,
    global: &GlobalOpts,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    match cmd {
        Command::Connect(args) => connect::handle(args, cfg, global, cancel).await,
        Command::List(args) => list::handle(args, cfg, global).await,
        Command::Countries => countries::handle(cfg, global).await,
        Command::Kill(args) => kill::handle(args, cfg, global).await,
        Command::Firewall(args) => firewall::handle(args, cfg, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
