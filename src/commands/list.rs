// `--list`: every category and framework in the table, with install status.

use crate::cli::cmd_enums::Cli;
use crate::libs::utilities::path_helpers::is_populated;
use crate::schemas::framework::{CategoryEntry, FrameworkRegistry};
use colored::Colorize;
use prettytable::{Table, format, row};
use std::path::Path;

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let (paths, registry) = super::load(cli)?;
    let table = build_table(&registry, &paths.install_base)?;
    table.printstd();
    Ok(())
}

/// One row per framework and per variant. The category default is marked with `*`.
fn build_table(registry: &FrameworkRegistry, install_base: &Path) -> anyhow::Result<Table> {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(row![b => "Category", "Framework", "Name", "Installed"]);

    for category in registry.categories() {
        for (framework, name, installed) in rows(registry, category, install_base)? {
            let mark = if installed {
                "yes".green().to_string()
            } else {
                String::new()
            };
            table.add_row(row![category.id, framework, name, mark]);
        }
    }
    Ok(table)
}

fn rows(
    registry: &FrameworkRegistry,
    category: &CategoryEntry,
    install_base: &Path,
) -> anyhow::Result<Vec<(String, String, bool)>> {
    let mut rows = Vec::new();
    for entry in &category.frameworks {
        let variants = std::iter::once(None).chain(entry.variants.iter().map(|v| Some(v.id.as_str())));
        for variant in variants {
            let descriptor = registry.find(&category.id, Some(&entry.id), variant)?;
            let mut label = descriptor.dir_name();
            if entry.category_default && variant.is_none() {
                label.push('*');
            }
            let installed = is_populated(&descriptor.default_install_path(install_base));
            rows.push((label, descriptor.name.clone(), installed));
        }
    }
    Ok(rows)
}
