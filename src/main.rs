//! # zensort CLI
//!
//! Command-line interface for the media organizer.
//!
//! ## Usage
//! ```bash
//! zensort --source /media/card --dest ~/Library
//! ```

mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
