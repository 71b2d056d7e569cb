//! console-capture CLI entry point.
//!
//! Parses arguments, initializes logging and dispatches to a command.

use clap::Parser;
use console_capture_cli::{cli, commands, error, logger, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors();

    let config = args.config.as_deref();
    let color = !args.no_color && ui::should_use_color();
    let result = match args.command {
        cli::Command::Capture(capture_args) => {
            commands::capture_execute(capture_args, config, color).await
        }
        cli::Command::Config => commands::config_execute(config),
    };

    result.map_err(error::cli_error_to_miette)
}
