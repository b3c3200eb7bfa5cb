mod catalog;
mod cli;
mod commands;
mod config;
mod integrations;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: config::Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "entitle", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: config::Config::load(cli.config.as_deref())?,
    };
    log::trace!("Running with verbosity {}", ctx.verbose);

    let result = match &cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Sequence(args) => commands::sequence::run(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        if let Some(error) = e.downcast_ref::<entitlement::Error>() {
            let kind = error.kind();
            ui::error(&format!("{}: {error}", kind.description()));
            ui::dim(kind.advice());
            std::process::exit(1);
        }
    }
    result
}
