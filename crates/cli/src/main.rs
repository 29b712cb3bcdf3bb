use std::process::ExitCode;

fn main() -> ExitCode {
    ganttbot_cli::run()
}
