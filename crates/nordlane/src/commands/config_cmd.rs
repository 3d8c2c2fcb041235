//! Config subcommand handlers.

use std::path::PathBuf;

use nordlane_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

fn target_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(config::load_config_from(&target_path(global))?)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { force } => {
            let path = target_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists { path });
            }
            config::save_config_to(&Config::default(), &path)?;
            util::status(global, &format!("Configuration written to {}", path.display()));
            util::status(
                global,
                "  Next: nordlane config set paths.credentials /path/to/auth.txt",
            );
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = load(global)?;
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("# unprintable: {e}")),
                |_| target_path(global).display().to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&target_path(global).display().to_string(), false);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let path = target_path(global);
            let cfg = config::set_value(&load(global)?, &key, &value)?;
            cfg.validate()?;
            config::save_config_to(&cfg, &path)?;
            util::status(global, &format!("{key} = {value}"));
            Ok(())
        }
    }
}
