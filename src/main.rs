use std::process::ExitCode;

fn main() -> ExitCode {
    go_app_builder::cli::run()
}
