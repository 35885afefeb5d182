mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use memake_lib::consts::PROJECT_FILENAME;
use memake_lib::execute::ExecuteConfig;
use memake_lib::memo::FingerprintPolicy;
use memake_lib::ops::BuildOptions;
use memake_lib::plan::BuildVariant;
use memake_lib::runner::Observer;
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// memake - incremental builds for C programs made of shared modules
#[derive(Parser)]
#[command(name = "memake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the project file
  #[arg(short, long, global = true, default_value = PROJECT_FILENAME)]
  file: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Maximum number of commands to run at once (default: number of CPUs)
  #[arg(short, long, global = true)]
  jobs: Option<usize>,

  /// How to compare files between runs: mtime or hash (default: whatever the memo store uses)
  #[arg(long, global = true)]
  fingerprint: Option<FingerprintPolicy>,

  /// How to find what a command reads: declared or strace
  #[arg(long, global = true, default_value = "declared")]
  observer: Observer,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct TargetArgs {
  /// Programs to build (default: all)
  targets: Vec<String>,

  /// Build the variant (adds its define to every compile, renames programs)
  #[arg(long)]
  variant: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Build programs, running only out-of-date commands
  Build {
    #[command(flatten)]
    targets: TargetArgs,
  },

  /// Show which commands a build would run, and why
  Plan {
    #[command(flatten)]
    targets: TargetArgs,
  },

  /// Remove every recorded build output and forget the build history
  Clean,

  /// Build, then copy programs into <PREFIX>/bin
  Install {
    #[command(flatten)]
    targets: TargetArgs,

    /// Installation prefix (default: ~/.local)
    #[arg(short, long)]
    prefix: Option<PathBuf>,
  },
}

impl Cli {
  fn build_options(&self, targets: &TargetArgs) -> BuildOptions {
    let mut execute = ExecuteConfig {
      observer: self.observer,
      fingerprint: self.fingerprint,
      ..ExecuteConfig::default()
    };
    if let Some(jobs) = self.jobs {
      execute.parallelism = jobs;
    }

    BuildOptions {
      targets: targets.targets.clone(),
      variant: if targets.variant {
        BuildVariant::On
      } else {
        BuildVariant::Off
      },
      execute,
    }
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  // Initialize logging
  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match &cli.command {
    Commands::Build { targets } => cmd::cmd_build(&cli.file, &cli.build_options(targets), cli.verbose, cli.output),
    Commands::Plan { targets } => cmd::cmd_plan(&cli.file, &cli.build_options(targets), cli.verbose, cli.output),
    Commands::Clean => cmd::cmd_clean(&cli.file, cli.output),
    Commands::Install { targets, prefix } => cmd::cmd_install(
      &cli.file,
      &cli.build_options(targets),
      prefix.clone(),
      cli.verbose,
      cli.output,
    ),
  }
}
