//! Configuration CLI
//!
//! Shows, initializes and validates avro-compat.toml.

use std::path::PathBuf;

use anyhow::{bail, Context};
use avro_compat::config::{user_config_file, CONFIG_FILE_NAMES};
use avro_compat::CompatConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "avro-compat-config")]
#[command(about = "Manage avro-compat configuration")]
struct Cli {
    /// Explicit config file, layered over avro-compat.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project directory
    #[arg(short, long, default_value = ".", global = true)]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Show {
        /// As TOML (default)
        #[arg(long, conflicts_with = "json")]
        toml: bool,
        /// As JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default configuration file
    Init {
        /// Target file (default: <project-dir>/avro-compat.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration and report problems
    Validate,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Show { toml: _, json } => {
            let config = load(&cli)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }

        Commands::Init { output, force } => {
            let path = output
                .clone()
                .unwrap_or_else(|| cli.project_dir.join(CONFIG_FILE_NAMES[0]));
            if path.exists() && !*force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            CompatConfig::default()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("✅ Wrote {}", path.display());
            Ok(())
        }

        Commands::Validate => {
            let config = load(&cli)?;
            let warnings = config.validate(&cli.project_dir)?;

            println!("🔍 Configuration sources:");
            for name in CONFIG_FILE_NAMES {
                let candidate = cli.project_dir.join(name);
                if candidate.exists() {
                    println!("  ✅ {}", candidate.display());
                }
            }
            if let Some(user) = user_config_file().filter(|p| p.exists()) {
                println!("  ✅ {}", user.display());
            }
            if let Some(explicit) = &cli.config {
                println!("  ✅ {}", explicit.display());
            }

            println!();
            if warnings.is_empty() {
                println!("✅ Configuration is valid");
            } else {
                for warning in &warnings {
                    println!("  ⚠️  {}", warning);
                }
                println!();
                println!("✅ Configuration is valid ({} warnings)", warnings.len());
            }
            Ok(())
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<CompatConfig> {
    CompatConfig::load_from(&cli.project_dir, cli.config.as_deref()).context("loading configuration")
}
