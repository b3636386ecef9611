use crate::output::print_json;
use analyst_core::config::{AnalystConfig, WarnLevel};
use analyst_core::io::write_if_missing;
use analyst_core::paths;
use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a default .analyst/config.yaml (never overwrites)
    Init,

    /// Print the effective configuration
    Show {
        #[arg(long, value_enum, default_value_t = ShowFormat::Yaml)]
        format: ShowFormat,
    },

    /// Validate the config for common mistakes
    Validate,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ShowFormat {
    Yaml,
    Json,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    root: &Path,
    config: Option<&Path>,
    subcmd: ConfigSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init => init(root, json),
        ConfigSubcommand::Show { format } => {
            let format = if json { ShowFormat::Json } else { format };
            show(root, config, format)
        }
        ConfigSubcommand::Validate => validate(root, config, json),
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = paths::config_path(root);
    let yaml = serde_yaml::to_string(&AnalystConfig::default())?;
    let created = write_if_missing(&path, yaml.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({ "path": path, "created": created }))?;
    } else if created {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, config: Option<&Path>, format: ShowFormat) -> anyhow::Result<()> {
    let config = super::load_config(root, config)?;
    match format {
        ShowFormat::Json => print_json(&config),
        ShowFormat::Yaml => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root, config)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
