//! # CLI Module
//!
//! Command-line interface for the control channel simulator.

mod app;
mod commands;
mod output;
mod simulate;

pub use app::{exit_with_error, run};

/// Print the banner shown when no command is given
pub fn print_banner() {
    println!(
        r#"
   ___  __   ___  _ __
  / _ \ \ \ / / '_ \| '_ \
 | (_) | \ V /| |_) | | | |
  \___/   \_/ | .__/|_| |_|
              |_|          v{}

Reliable control channel over a lossy transport
"#,
        env!("CARGO_PKG_VERSION")
    );
}
