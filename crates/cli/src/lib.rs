pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "ganttbot",
    about = "Ganttbot operator CLI",
    long_about = "Inspect configuration, check readiness, render charts offline, and refresh the canvas chart.",
    after_help = "Examples:\n  ganttbot doctor --json\n  ganttbot config\n  ganttbot render --input rows.json --output chart.png\n  ganttbot refresh F0LIST123"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack targets, and chart font readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Render a chart PNG from a JSON file of task rows without calling Slack")]
    Render {
        #[arg(long, help = "JSON array of rows with id, name, start, end, category, group")]
        input: PathBuf,
        #[arg(long, help = "Where to write the PNG")]
        output: PathBuf,
    },
    #[command(about = "Fetch the list, render the chart, and update the canvas once")]
    Refresh {
        #[arg(help = "List id to read instead of targets.list_id")]
        list_id: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::CommandResult::plain(0, commands::config::run()),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Render { input, output } => commands::render::run(&input, &output),
        Command::Refresh { list_id } => commands::refresh::run(list_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
