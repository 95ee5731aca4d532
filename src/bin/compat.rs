//! Avro Compatibility CLI
//!
//! Runs the compatibility check for a project, alone or as part of the `check`
//! verification lifecycle, and inspects the file sets and schemas involved.

use std::path::PathBuf;

use anyhow::Context;
use avro_compat::resolver::archive::package_idl;
use avro_compat::resolver::collect_idl;
use avro_compat::task::verification_graph;
use avro_compat::{
    CompatConfig, CompatibilityTask, FileSetResolver, Task, TaskOutcome, CHECK_TASK_NAME,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "avro-compat")]
#[command(about = "Check Avro IDL schemas against previously published versions")]
struct Cli {
    /// Explicit config file, layered over avro-compat.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project directory
    #[arg(short, long, default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the compatibility check task on its own
    Check {
        /// Extra files or directories for the against set
        #[arg(short, long)]
        against: Vec<PathBuf>,
    },

    /// Run the check lifecycle (the compatibility task and everything else it needs)
    Verify {
        #[arg(short, long)]
        against: Vec<PathBuf>,
    },

    /// Print the resolved source and against file sets
    Resolve {
        #[arg(short, long)]
        against: Vec<PathBuf>,
    },

    /// Package the source IDL into a jar for publishing
    Package {
        /// Jar to write, default target/avro-compat/<name>-idl.jar
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List schema names and fingerprints
    Schemas {
        /// Files or directories to load instead of the source set
        paths: Vec<PathBuf>,

        /// List the resolved against set instead of the source set
        #[arg(long)]
        against: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut filter = EnvFilter::from_default_env();
    if cli.verbose {
        filter = filter.add_directive(LevelFilter::DEBUG.into());
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CompatConfig::load_from(&cli.project_dir, cli.config.as_deref())
        .context("loading configuration")?;

    match cli.command {
        Commands::Check { against } => {
            let task = CompatibilityTask::from_config(config, &cli.project_dir, against);
            let outcome = task.run()?;
            print_outcome(cli.format, task.name(), &outcome)?;
            Ok(())
        }

        Commands::Verify { against } => {
            let task = CompatibilityTask::from_config(config, &cli.project_dir, against);
            let graph = verification_graph(task)?;
            let outcomes = graph.run(CHECK_TASK_NAME)?;

            if cli.format == Format::Json {
                let tasks: Vec<_> = outcomes
                    .iter()
                    .map(|(name, outcome)| json!({ "task": name, "result": outcome }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for (name, outcome) in &outcomes {
                    print_outcome(cli.format, name, outcome)?;
                }
                println!();
                println!("✅ {} passed", CHECK_TASK_NAME);
            }
            Ok(())
        }

        Commands::Resolve { against } => {
            let sets = FileSetResolver::new(&config, &cli.project_dir)
                .with_against_paths(against)
                .resolve()?;

            if cli.format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&sets)?);
            } else {
                println!("source ({} files):", sets.source.len());
                for path in &sets.source {
                    println!("  {}", path.display());
                }
                println!("against ({} files):", sets.against.len());
                for path in &sets.against {
                    println!("  {}", path.display());
                }
            }
            Ok(())
        }

        Commands::Package { output } => {
            let resolver = FileSetResolver::new(&config, &cli.project_dir);
            let output = output.unwrap_or_else(|| {
                let name = config.project.name.as_deref().unwrap_or("schemas");
                cli.project_dir
                    .join("target/avro-compat")
                    .join(format!("{}-idl.jar", name))
            });
            // load first so a broken schema is never published
            config.loader().load(&collect_idl(&resolver.source_dir())?)?;
            let entries = package_idl(&resolver.source_dir(), &output)?;

            if cli.format == Format::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "output": output, "entries": entries }))?
                );
            } else {
                println!("📦 {} idl files -> {}", entries.len(), output.display());
                for entry in &entries {
                    println!("  {}", entry);
                }
            }
            Ok(())
        }

        Commands::Schemas { paths, against } => {
            let files = if !paths.is_empty() {
                let mut files = Vec::new();
                for path in &paths {
                    files.extend(collect_idl(path)?);
                }
                files
            } else {
                let sets = FileSetResolver::new(&config, &cli.project_dir).resolve()?;
                if against {
                    sets.against
                } else {
                    sets.source
                }
            };

            let set = config.loader().load(&files)?;

            if cli.format == Format::Json {
                let listing: Vec<_> = set
                    .iter()
                    .map(|(name, schema)| {
                        json!({
                            "name": name,
                            "fingerprint": schema.fingerprint(),
                            "origin": set.origin(name),
                            "canonical_form": schema.canonical_form(),
                            "schema": schema.json(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("📦 {} schemas from {} files", set.len(), files.len());
                for (name, schema) in set.iter() {
                    println!("  {}  {}", schema.fingerprint().short(), name);
                }
            }
            Ok(())
        }
    }
}

fn print_outcome(format: Format, name: &str, outcome: &TaskOutcome) -> anyhow::Result<()> {
    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome {
        TaskOutcome::Skipped => {
            println!("⏭️  {} skipped: no against schemas", name);
        }
        TaskOutcome::Passed(report) => {
            println!("✅ {}: {}", name, report.summary());
            for added in &report.added {
                println!("   + {} (new)", added);
            }
        }
        TaskOutcome::Completed => {
            println!("✅ {}", name);
        }
    }
    Ok(())
}
