use anyhow::{bail, Context, Result};
use clap::Subcommand;

use sluice_engine::{ConnectionRegistry, DiscoverOptions};

use crate::local::{redact, EnvRegistry};
use crate::ui;

#[derive(Debug, Subcommand)]
pub enum ConnsCommand {
    /// List connections declared as NAME=url environment variables
    List,
    /// Check that a connection is reachable
    Test {
        /// Connection name or URL
        name: String,
    },
    /// List objects on a connection
    Discover {
        /// Connection name or URL
        name: String,
        /// Glob the object names must match
        #[arg(default_value = "*")]
        pattern: String,
        /// Restrict discovery to one schema
        #[arg(long)]
        schema: Option<String>,
        /// Descend into sub-directories
        #[arg(long)]
        recursive: bool,
        /// Print the result as a JSON array
        #[arg(long)]
        json: bool,
    },
}

/// Execute a `conns` subcommand against the environment registry.
pub fn execute(command: ConnsCommand) -> Result<()> {
    let registry = EnvRegistry::from_env();
    match command {
        ConnsCommand::List => list(&registry),
        ConnsCommand::Test { name } => test_connection(&registry, &name),
        ConnsCommand::Discover {
            name,
            pattern,
            schema,
            recursive,
            json,
        } => {
            let options = DiscoverOptions { schema, recursive };
            let objects = registry
                .discover(&name, &pattern, &options)
                .with_context(|| format!("Failed to discover objects on '{name}'"))?;
            if json {
                println!("{}", serde_json::to_string(&objects)?);
            } else {
                for object in &objects {
                    println!("{object}");
                }
                ui::info(format!("Found {} object(s)", objects.len()));
            }
            Ok(())
        }
    }
}

fn list(registry: &EnvRegistry) -> Result<()> {
    let connections = registry.connections();
    if connections.is_empty() {
        ui::info("No connections found. Declare one as NAME=scheme://... in the environment.");
        return Ok(());
    }
    for conn in connections {
        println!("{:<24} {:<9} {}", conn.name, conn.kind.as_str(), redact(&conn.url));
    }
    Ok(())
}

fn test_connection(registry: &EnvRegistry, name: &str) -> Result<()> {
    let info = registry.resolve(name)?;
    let reachable = registry
        .test(name)
        .with_context(|| format!("Failed to test connection '{name}'"))?;
    if !reachable {
        bail!("connection '{name}' is not reachable ({})", redact(&info.url));
    }
    ui::success(format!("Connection '{name}' is reachable"));
    Ok(())
}
