//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use nordlane_core::{Candidate, Endpoint};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Load percentage, green under 40, yellow under 70, red above.
pub fn paint_load(load: u8, color: bool) -> String {
    let text = format!("{load}%");
    if !color {
        return text;
    }
    match load {
        0..40 => text.green().to_string(),
        40..70 => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single item; `detail_fn` produces the table-mode view.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub(crate) fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}

// ── Table rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct ServerRow {
    #[tabled(rename = "Server")]
    pub identifier: String,
    #[tabled(rename = "Load")]
    pub load: String,
    #[tabled(rename = "Country")]
    pub country: String,
    #[tabled(rename = "Categories")]
    pub categories: String,
    #[tabled(rename = "Area")]
    pub areas: String,
}

impl ServerRow {
    pub fn from_endpoint(endpoint: &Endpoint, color: bool) -> Self {
        Self {
            identifier: endpoint.identifier.clone(),
            load: paint_load(endpoint.load_percent, color),
            country: endpoint.country_name.clone(),
            categories: endpoint
                .categories
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            areas: endpoint.area_names.join(", "),
        }
    }
}

#[derive(Serialize)]
pub struct CountryEntry {
    pub code: String,
    pub name: String,
}

#[derive(Tabled)]
pub struct CountryRow {
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "Country")]
    pub name: String,
}

impl From<&CountryEntry> for CountryRow {
    fn from(entry: &CountryEntry) -> Self {
        Self {
            code: entry.code.to_ascii_uppercase(),
            name: entry.name.clone(),
        }
    }
}

#[derive(Tabled)]
pub struct CandidateRow {
    #[tabled(rename = "")]
    pub marker: String,
    #[tabled(rename = "Server")]
    pub identifier: String,
    #[tabled(rename = "Load")]
    pub load: String,
    #[tabled(rename = "Avg ms")]
    pub avg: u32,
    #[tabled(rename = "Min/Max ms")]
    pub spread: String,
    #[tabled(rename = "Mdev")]
    pub mdev: String,
}

impl CandidateRow {
    pub fn new(candidate: &Candidate, chosen: bool, color: bool) -> Self {
        let marker = match (chosen, color) {
            (true, true) => "▶".green().to_string(),
            (true, false) => "*".into(),
            (false, _) => String::new(),
        };
        Self {
            marker,
            identifier: candidate.identifier().to_owned(),
            load: paint_load(candidate.server.load_percent, color),
            avg: candidate.latency.avg,
            spread: format!("{}/{}", candidate.latency.min, candidate.latency.max),
            mdev: candidate
                .latency
                .mdev
                .map_or_else(|| "-".into(), |m| m.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Item {
        id: String,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: String,
    }

    fn items() -> Vec<Item> {
        vec![Item { id: "se1".into() }, Item { id: "se2".into() }]
    }

    #[test]
    fn plain_emits_one_id_per_line() {
        let out = render_list(
            OutputFormat::Plain,
            &items(),
            |i| ItemRow { id: i.id.clone() },
            |i| i.id.clone(),
        );
        assert_eq!(out, "se1\nse2");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(
            OutputFormat::JsonCompact,
            &items(),
            |i| ItemRow { id: i.id.clone() },
            |i| i.id.clone(),
        );
        assert_eq!(out, r#"[{"id":"se1"},{"id":"se2"}]"#);
    }

    #[test]
    fn table_contains_headers_and_rows() {
        let out = render_list(
            OutputFormat::Table,
            &items(),
            |i| ItemRow { id: i.id.clone() },
            |i| i.id.clone(),
        );
        assert!(out.contains("ID"));
        assert!(out.contains("se2"));
    }

    #[test]
    fn load_without_color_is_plain_text() {
        assert_eq!(paint_load(12, false), "12%");
        assert_ne!(paint_load(90, true), "90%");
    }
}
