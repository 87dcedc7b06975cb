//! Operations CLI for the authorization schema
//!
//! ```bash
//! # Print the backend schema for a resource config, one fragment per namespace
//! rebac-ops schema generate --config resources.yaml --predefined
//!
//! # Check a resource config without printing the schema
//! rebac-ops schema validate --config resources.yaml
//! ```
//!
//! Logging follows the `log` section of the optional `--app-config` file and
//! the `REBAC__LOG__*` environment overrides.

use anyhow::{Context, Result};
use auth_zanzibar::{
    compile, generate_schema, namespaces_from_resource_config, parse_config_yaml,
    with_predefined_namespaces, NamespaceConfigMap,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Separator printed between schema fragments.
pub const FRAGMENT_SEPARATOR: &str = "\n--\n";

#[derive(Parser, Debug)]
#[command(name = "rebac-ops")]
#[command(about = "Relationship authorization schema tooling")]
pub struct Cli {
    /// Application configuration file (logging section is used)
    #[arg(long, global = true)]
    pub app_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Schema operations
    #[command(subcommand)]
    Schema(SchemaCommand),
}

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Compile a resource config and print the schema fragments
    Generate {
        /// Resource config YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Merge the predefined organization/project/group namespaces
        #[arg(long)]
        predefined: bool,
    },
    /// Compile a resource config and report whether it is valid
    Validate {
        /// Resource config YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Merge the predefined organization/project/group namespaces
        #[arg(long)]
        predefined: bool,
    },
}

/// Run a parsed command and return what should be printed.
pub fn run(cli: &Cli) -> Result<String> {
    match &cli.command {
        Command::Schema(SchemaCommand::Generate { config, predefined }) => {
            let namespaces = load_namespaces(config, *predefined)?;
            let fragments = generate_schema(&namespaces).context("schema generation failed")?;
            info!(fragments = fragments.len(), "Schema generated");
            Ok(fragments.join(FRAGMENT_SEPARATOR))
        }
        Command::Schema(SchemaCommand::Validate { config, predefined }) => {
            let namespaces = load_namespaces(config, *predefined)?;
            let definitions = compile(&namespaces).context("schema validation failed")?;
            Ok(format!(
                "{}: {} definitions valid",
                config.display(),
                definitions.len()
            ))
        }
    }
}

fn load_namespaces(path: &Path, predefined: bool) -> Result<NamespaceConfigMap> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let resources = parse_config_yaml(&content)?;
    let namespaces = namespaces_from_resource_config(&resources)?;
    debug!(namespaces = namespaces.len(), predefined, "Resource config loaded");

    Ok(if predefined {
        with_predefined_namespaces(&namespaces)
    } else {
        namespaces
    })
}
