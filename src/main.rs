//! rxtest - script-driven regex test harness
//!
//! Reads test scripts of patterns and subject lines and prints match results
//! at 8, 16 or 32-bit code-unit width.

mod core;
mod output;

#[cfg(feature = "cli")]
mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    #[cfg(feature = "cli")]
    {
        let args = cli::parse();

        if let Some(name) = &args.config {
            return match cli::handle_config(name, args.format) {
                Ok((output, status)) => {
                    println!("{}", output);
                    ExitCode::from(status)
                }
                Err(e) => {
                    eprintln!("{}", e);
                    ExitCode::from(u8::MAX)
                }
            };
        }

        match cli::handle_run(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                report_error(&e);
                ExitCode::FAILURE
            }
        }
    }

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("CLI feature not enabled. Build with --features cli");
        ExitCode::FAILURE
    }
}

/// Output a fatal error as structured JSON on stderr
#[cfg(feature = "cli")]
fn report_error(e: &anyhow::Error) {
    use crate::core::modifiers::ModifierError;
    use crate::core::HarnessError;
    use crate::output::{error_codes, json::format_json_compact, ErrorResponse};

    let code = if let Some(err) = e.downcast_ref::<HarnessError>() {
        err.code()
    } else if e.downcast_ref::<ModifierError>().is_some() {
        error_codes::INVALID_MODIFIER
    } else if e.downcast_ref::<std::io::Error>().is_some() {
        error_codes::FILE_NOT_FOUND
    } else {
        error_codes::INVALID_INPUT
    };
    let mut error = ErrorResponse::new(code, e.to_string());
    if let Some(cause) = e.chain().nth(1) {
        error = error.with_context(cause.to_string());
    }
    eprintln!("{}", format_json_compact(&error));
}
