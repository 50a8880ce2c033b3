use std::process::ExitCode;

fn main() -> ExitCode {
    agroquote_cli::run()
}
