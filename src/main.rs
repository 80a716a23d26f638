// src/main.rs

mod cli;
mod commands;
mod db;
mod dispatch;
mod error;
mod generate;
mod models;
mod reply;
mod slack;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    // stdout carries replies; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = &cli.config;

    let result = match cli.command {
        Commands::Init => commands::handle_init(config),
        Commands::Mention { text } => commands::handle_mention(config, text),
        Commands::Events { post } => commands::handle_events(config, post),
        Commands::Get { num, search } => commands::handle_get(config, num, search),
        Commands::Whoami => commands::handle_whoami(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
