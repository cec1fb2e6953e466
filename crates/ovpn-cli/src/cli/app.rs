//! # CLI Application
//!
//! CLI definition and command dispatch using clap.

use clap::{Parser, Subcommand};

use super::commands::{cmd_check, cmd_init, cmd_simulate, SimulateArgs};
use super::output;
use super::print_banner;
use ovpn_protocol::Result;

/// ovpn - reliable control channel over a lossy transport
#[derive(Parser)]
#[command(
    name = "ovpn",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reliable, replay-protected VPN control channel simulator",
    long_about = None,
    after_help = "Examples:\n  \
        ovpn simulate\n  \
        ovpn simulate --loss 0.3 --seed 42 --messages 100\n  \
        ovpn init > ovpn.toml\n  \
        ovpn check -c ovpn.toml\n  \
        OVPN_KEY=<64 hex chars> ovpn sim -c ovpn.toml -v",
    styles = get_styles(),
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a client and a server over a lossy in-memory wire
    #[command(visible_alias = "sim")]
    Simulate {
        /// Config file path (built-in defaults if omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Application messages sent in each direction
        #[arg(short, long)]
        messages: Option<usize>,

        /// Probability that a datagram is lost
        #[arg(short, long)]
        loss: Option<f64>,

        /// Probability that a datagram is delayed behind later ones
        #[arg(short, long)]
        reorder: Option<f64>,

        /// Seed for the wire's random number generator
        #[arg(short, long)]
        seed: Option<u64>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Minimal output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print a config template
    Init,

    /// Validate a config file and show the effective settings
    #[command(visible_alias = "validate")]
    Check {
        /// Config file path
        #[arg(short, long, default_value = "ovpn.toml")]
        config: String,
    },
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .header(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .literal(clap::builder::styling::AnsiColor::BrightGreen.on_default())
        .placeholder(clap::builder::styling::AnsiColor::Cyan.on_default())
        .valid(clap::builder::styling::AnsiColor::BrightGreen.on_default())
        .invalid(clap::builder::styling::AnsiColor::BrightRed.on_default())
}

/// Run the CLI application
pub fn run() -> Result<()> {
    // Show banner if no args
    if std::env::args().len() < 2 {
        print_banner();
        let _ = Cli::try_parse();
        std::process::exit(1);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            messages,
            loss,
            reorder,
            seed,
            verbose,
            quiet,
        } => cmd_simulate(SimulateArgs {
            config,
            messages,
            loss,
            reorder,
            seed,
            verbose,
            quiet,
        }),

        Commands::Init => cmd_init(),

        Commands::Check { config } => cmd_check(&config),
    }
}

/// Print error and exit
pub fn exit_with_error(e: impl std::fmt::Display) -> ! {
    output::print_error(e);
    std::process::exit(1);
}
