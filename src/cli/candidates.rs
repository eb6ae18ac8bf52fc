use anyhow::{Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use std::collections::HashMap;
use std::path::Path;

use crate::server::image::TrackedStream;
use crate::server::pullthrough::{identify_candidate_repositories, PullthroughSpec};

/// Read a stream resource from a JSON or YAML file
pub fn load_stream(path: &Path) -> Result<TrackedStream> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let stream = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {} as JSON", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {} as YAML", path.display()))?
    };
    Ok(stream)
}

/// Local registry host from the configuration, or empty if none is configured
pub fn configured_local_registry() -> String {
    match crate::server::settings::Settings::new() {
        Ok(settings) => settings.registry.local_hostname,
        Err(e) => {
            tracing::debug!("No usable configuration, not skipping a local registry: {}", e);
            String::new()
        }
    }
}

/// Print the upstream repositories a pull-through of the stream in `file` would search
pub fn handle_candidates(
    file: &Path,
    local_registry: &str,
    secondary: bool,
    json: bool,
) -> Result<()> {
    let stream = load_stream(file)?;
    let (repositories, search) =
        identify_candidate_repositories(&stream, local_registry, !secondary);
    let specs: HashMap<String, &PullthroughSpec> = search
        .iter()
        .map(|(key, spec)| (key.to_string(), spec))
        .collect();

    if json {
        let entries: Vec<serde_json::Value> = repositories
            .iter()
            .filter_map(|repository| {
                specs.get(repository).map(|spec| {
                    serde_json::json!({
                        "repository": repository,
                        "reference": spec.reference.exact(),
                        "insecure": spec.insecure,
                    })
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if repositories.is_empty() {
        println!(
            "No candidate repositories for {}/{}",
            stream.namespace(),
            stream.name()
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("REPOSITORY").add_attribute(Attribute::Bold),
            Cell::new("REFERENCE").add_attribute(Attribute::Bold),
            Cell::new("INSECURE").add_attribute(Attribute::Bold),
        ]);

    for repository in &repositories {
        let Some(spec) = specs.get(repository) else {
            continue;
        };
        table.add_row(vec![
            Cell::new(repository),
            Cell::new(spec.reference.exact()),
            Cell::new(if spec.insecure { "yes" } else { "no" }),
        ]);
    }

    println!("{}", table);
    Ok(())
}
