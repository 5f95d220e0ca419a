use std::process::ExitCode;

fn main() -> ExitCode {
    architect_cli::run()
}
