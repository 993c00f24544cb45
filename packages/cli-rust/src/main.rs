//! kicup CLI entry point

use std::process::ExitCode;

fn main() -> ExitCode {
    match kicup::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            kicup::report_error(&err);
            ExitCode::FAILURE
        }
    }
}
