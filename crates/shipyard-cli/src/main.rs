//! shipyard: install a platform's releases into a cluster, in order,
//! resuming where the last run stopped.
//!
//! # Usage
//!
//! ```text
//! shipyard init --name platform
//! shipyard install --definition install.toml --config shipyard.toml --values-dir values/
//! shipyard status --namespace platform
//! shipyard status --namespace platform --ledger-backend file --ledger .shipyard/ledger.redb
//! shipyard forget --namespace platform --kind release --name gateway
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "shipyard",
    about = "Shipyard: dependency-ordered, resumable chart installs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Install every release of a definition, skipping finished ones.
    Install(commands::install::InstallArgs),

    /// Show recorded task state for a namespace.
    Status {
        #[command(flatten)]
        cluster: commands::ClusterArgs,
        #[arg(short, long)]
        namespace: String,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Drop a task record so the next run redoes it.
    Forget {
        #[command(flatten)]
        cluster: commands::ClusterArgs,
        #[arg(short, long)]
        namespace: String,
        #[arg(short, long, value_enum, default_value = "release")]
        kind: commands::status::KindArg,
        #[arg(long)]
        name: String,
    },

    /// Write a starter install definition.
    Init {
        #[arg(long)]
        name: String,
        #[arg(short, long, default_value = "install.toml")]
        output: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,shipyard=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Install(args) => commands::install::run(args).await,
        Command::Status {
            cluster,
            namespace,
            format,
        } => commands::status::status(&cluster, &namespace, format),
        Command::Forget {
            cluster,
            namespace,
            kind,
            name,
        } => commands::status::forget(&cluster, &namespace, kind, &name),
        Command::Init {
            name,
            output,
            force,
        } => commands::init::init(&name, &output, force),
    }
}
