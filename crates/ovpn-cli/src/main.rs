//! # ovpn - Control Channel Simulator

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        cli::exit_with_error(e);
    }
}
