// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! charla - a WhatsApp conversational gateway.
//!
//! This is the binary entry point for the gateway service.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod serve;

/// charla - a WhatsApp conversational gateway.
#[derive(Parser, Debug)]
#[command(name = "charla", version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server (the default).
    Serve,
    /// Print the resolved configuration with secrets redacted.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => charla_config::load_config_from_path(path),
        None => charla_config::load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Commands::Config => {
            match charla_config::validate_config(&config) {
                Ok(()) => println!("{config:#?}"),
                Err(issues) => {
                    println!("{config:#?}");
                    eprintln!("\nconfiguration issues:");
                    for issue in issues {
                        eprintln!("  - {issue}");
                    }
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
    }
}
