use std::path::PathBuf;
use std::process::Command;

use avro_compat::task::{verification_graph, LifecycleTask};
use avro_compat::{
    CompatConfig, CompatError, CompatibilityTask, Task, TaskOutcome, CHECK_TASK_NAME,
    COMPATIBILITY_CHECK_TASK_NAME,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Project automation: wires the avro compatibility check into cargo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run `cargo test` and the avro compatibility check as the `check` lifecycle
    Verify {
        /// Project directory holding avro-compat.toml
        #[arg(short, long, default_value = ".")]
        project_dir: PathBuf,

        /// Skip `cargo test`
        #[arg(long)]
        no_test: bool,

        /// Print the execution plan without running anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Run only the compatibility check through the avro-compat binary
    Compat {
        /// Arguments passed to `avro-compat check`
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

/// A cargo invocation as a task in the verification graph
struct CargoTask {
    name: &'static str,
    args: Vec<&'static str>,
}

impl Task for CargoTask {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self) -> avro_compat::Result<TaskOutcome> {
        println!("💡 Running: cargo {}", self.args.join(" "));
        let status = Command::new("cargo").args(&self.args).status()?;
        if !status.success() {
            return Err(CompatError::TaskGraph(format!(
                "cargo {} failed with exit code {}",
                self.args.join(" "),
                status.code().unwrap_or(-1)
            )));
        }
        Ok(TaskOutcome::Completed)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Verify {
            project_dir,
            no_test,
            dry_run,
        } => {
            let config = CompatConfig::load_from(&project_dir, None)?;
            let task = CompatibilityTask::from_config(config, &project_dir, Vec::new());
            let mut graph = verification_graph(task)?;

            if no_test {
                graph.register(Box::new(LifecycleTask::new("test", "Tests skipped")))?;
            } else {
                graph.register(Box::new(CargoTask {
                    name: "test",
                    args: vec!["test", "--workspace"],
                }))?;
            }
            graph.depends_on(CHECK_TASK_NAME, "test")?;
            // schema breakage is reported before spending time on tests
            graph.depends_on("test", COMPATIBILITY_CHECK_TASK_NAME)?;

            let plan = graph.execution_plan(CHECK_TASK_NAME)?;
            println!("🔍 {}: {}", CHECK_TASK_NAME, plan.join(" -> "));
            if dry_run {
                return Ok(());
            }

            for (name, outcome) in graph.run(CHECK_TASK_NAME)? {
                match outcome {
                    TaskOutcome::Skipped => println!("⏭️  {} skipped", name),
                    TaskOutcome::Passed(report) => println!("✅ {}: {}", name, report.summary()),
                    TaskOutcome::Completed => println!("✅ {}", name),
                }
            }
            Ok(())
        }

        Commands::Compat { args } => {
            let mut cargo_args = vec!["run", "-p", "avro-compat", "--bin", "avro-compat", "--", "check"];
            cargo_args.extend(args.iter().map(String::as_str));
            println!("💡 Running: cargo {}", cargo_args.join(" "));
            let status = Command::new("cargo").args(&cargo_args).status()?;
            if !status.success() {
                anyhow::bail!("avro-compat check failed with exit code {}", status.code().unwrap_or(-1));
            }
            Ok(())
        }
    }
}
