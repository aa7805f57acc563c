use std::path::Path;

use anyhow::Result;
use console::Style;
use orrery_core::pipeline::{Catalogue, Registry};

use super::load_settings;

/// List every configured pipeline, failing loudly on a bad entry.
pub fn run(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let registry = Registry::new(&settings, Catalogue::builtin());
    let resolved = registry.validate_all()?;

    let name = Style::new().cyan().bold();
    let label = Style::new().dim();
    for pipeline in &resolved {
        println!(
            "{}  {}",
            name.apply_to(&pipeline.name),
            label.apply_to(&pipeline.class_path)
        );
        match &pipeline.flags {
            Some(schema) if !schema.0.is_empty() => {
                for (flag, spec) in &schema.0 {
                    println!(
                        "    --flag {flag}=<value>  {} (default: {})",
                        spec.long_name, spec.default
                    );
                }
            }
            _ => println!("    {}", label.apply_to("no flags")),
        }
    }
    Ok(())
}
