//! Dev/test harness for the sandbox interceptor — not the controller
//! (out of scope per spec section 1), but a way to hand-build a manifest,
//! inspect one, dry-run the access-check engine against it, and replay a
//! captured report-channel session, without a real build engine or a real
//! Windows process tree in the loop.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod description;

#[derive(Parser, Debug)]
#[command(
    name = "sandbox-cli",
    version,
    about = "Dev harness for the Windows file-access-manifest sandbox interceptor"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hand-build or inspect a manifest payload (section 6).
    Manifest {
        #[command(subcommand)]
        action: ManifestCommand,
    },
    /// Dry-run the access-check engine (C4) against a decoded manifest.
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },
    /// Replay a captured report-channel session (C8).
    Report {
        #[command(subcommand)]
        action: ReportCommand,
    },
    /// The CLI's own on-disk config (separate from a manifest payload).
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ManifestCommand {
    /// Encode a TOML manifest description into the binary payload.
    Build {
        #[arg(long)]
        description: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Decode a binary payload and print a summary.
    Decode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Check one path against a decoded manifest's policy tree.
    Check {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        path: String,
        #[arg(long, value_enum, default_value = "read")]
        kind: commands::policy::CheckKind,
        /// Whether the path is reported as existing on disk.
        #[arg(long)]
        existent: bool,
        #[arg(long)]
        opened_directory: bool,
        /// `FailUnexpectedFileAccesses` (section 3's Policy Flags table).
        #[arg(long)]
        fail_unexpected_file_accesses: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    /// Render a framed report capture.
    Replay {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    Print {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Manifest { action } => match action {
            ManifestCommand::Build { description, output } => {
                commands::manifest::build(&description, &output)
            }
            ManifestCommand::Decode { input, json } => commands::manifest::decode(&input, json),
        },
        Commands::Policy { action } => match action {
            PolicyCommand::Check {
                manifest,
                path,
                kind,
                existent,
                opened_directory,
                fail_unexpected_file_accesses,
                json,
            } => commands::policy::check(
                &manifest,
                &path,
                kind,
                existent,
                opened_directory,
                fail_unexpected_file_accesses,
                json,
            ),
        },
        Commands::Report { action } => match action {
            ReportCommand::Replay { input, json } => commands::report::replay(&input, json),
        },
        Commands::Config { action } => match action {
            ConfigCommand::Init { path, force } => commands::config::init(path, force),
            ConfigCommand::Print { path } => commands::config::print_effective(path),
        },
    }
}
