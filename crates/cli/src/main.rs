use std::process::ExitCode;

fn main() -> ExitCode {
    rfqbrief_cli::run()
}
