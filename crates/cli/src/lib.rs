pub mod commands;
pub mod http;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use switchboard_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard support-desk routing CLI",
    long_about = "Route support requests through triage, capability gating, and \
                  guardrail validation against a configured inference provider.",
    after_help = "Examples:\n  switchboard chat --identity ana --privileged\n  switchboard config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to switchboard.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive support session")]
    Chat {
        #[arg(long, default_value = "guest", help = "Caller identity")]
        identity: String,
        #[arg(long, help = "Mark the caller as privileged")]
        privileged: bool,
        #[arg(long, help = "Print every request event, not just the final answer")]
        verbose: bool,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let result = match cli.command {
        Command::Chat { identity, privileged, verbose } => {
            commands::chat::run(&config, identity, privileged, verbose).await
        }
        Command::Config => commands::config::run(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &AppConfig) {
    use switchboard_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn chat_flags_parse() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "chat",
            "--identity",
            "ana",
            "--privileged",
            "--verbose",
        ])
        .expect("parses");

        match cli.command {
            Command::Chat { identity, privileged, verbose } => {
                assert_eq!(identity, "ana");
                assert!(privileged);
                assert!(verbose);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_subcommand_parses_with_config_path() {
        let cli = Cli::try_parse_from(["switchboard", "config", "--config", "custom.toml"])
            .expect("parses");
        assert!(matches!(cli.command, Command::Config));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("custom.toml")));
    }
}
