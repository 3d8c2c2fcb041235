//! `nordlane list`: filtered servers without ranking or probing.

use std::collections::BTreeSet;

use nordlane_config::Config;

use crate::cli::{GlobalOpts, ListArgs, OutputFormat, RankArgs};
use crate::error::CliError;
use crate::output::{self, CountryEntry, ServerRow};

use super::{countries, util};

pub async fn handle(args: ListArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let pipeline = util::listing_pipeline(cfg)?;

    // Nothing to filter on: show where servers exist instead.
    if args.place.country.is_none() && util::category(&args.place.category).is_none() {
        let bar = util::spinner("Fetching server directory", global.quiet);
        let result = pipeline.countries().await;
        bar.finish_and_clear();
        let entries: Vec<CountryEntry> = result?
            .into_iter()
            .map(|(code, name)| CountryEntry { code, name })
            .collect();
        countries::render(&entries, global);
        return Ok(());
    }

    let criteria = util::criteria(&pipeline, cfg, &args.place, &RankArgs::default()).await?;
    let message = if args.areas || criteria.area.is_some() {
        "Resolving server localities"
    } else {
        "Fetching server directory"
    };
    let bar = util::spinner(message, global.quiet);
    let result = pipeline.list_servers(&criteria, args.areas).await;
    bar.finish_and_clear();

    let mut servers = result?;
    servers.sort_by(|a, b| {
        a.load_percent
            .cmp(&b.load_percent)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });

    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        &servers,
        |e| ServerRow::from_endpoint(e, color),
        |e| e.identifier.clone(),
    );
    output::print_output(&out, global.quiet);

    if args.areas && global.output == OutputFormat::Table && !global.quiet {
        let areas: BTreeSet<&str> = servers
            .iter()
            .flat_map(|e| e.area_names.iter().map(String::as_str))
            .collect();
        if !areas.is_empty() {
            let names: Vec<&str> = areas.into_iter().collect();
            println!("\nAreas: {}", names.join(", "));
        }
    }
    if servers.is_empty() {
        util::status(global, &format!("No servers match {}", criteria.describe()));
    }
    Ok(())
}
