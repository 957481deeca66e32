use std::process::ExitCode;

fn main() -> ExitCode {
    rudolph_cli::run()
}
