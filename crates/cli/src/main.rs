use std::process::ExitCode;

fn main() -> ExitCode {
    curbside_cli::run()
}
