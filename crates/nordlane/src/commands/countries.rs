//! `nordlane countries`.

use nordlane_config::Config;
use nordlane_core::directory::{self, Directory};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, CountryEntry, CountryRow};

use super::util;

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let service = util::directory_service(cfg)?;
    let bar = util::spinner("Fetching server directory", global.quiet);
    let endpoints = service.endpoints().await;
    bar.finish_and_clear();

    let entries: Vec<CountryEntry> = directory::countries(&endpoints?)
        .into_iter()
        .map(|(code, name)| CountryEntry { code, name })
        .collect();
    render(&entries, global);
    Ok(())
}

pub fn render(entries: &[CountryEntry], global: &GlobalOpts) {
    let out = output::render_list(global.output, entries, |e| CountryRow::from(e), |c| c.code.clone());
    output::print_output(&out, global.quiet);
}
