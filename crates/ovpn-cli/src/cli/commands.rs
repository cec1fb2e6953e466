//! # Command Implementations

use ovpn_core::config::{example_config, LoggingSection, ProtoConfig};
use ovpn_protocol::Result;

use super::output;
use super::simulate::{self, SimOptions, SimReport};

/// Overrides given on the command line
#[derive(Debug, Default)]
pub struct SimulateArgs {
    pub config: Option<String>,
    pub messages: Option<usize>,
    pub loss: Option<f64>,
    pub reorder: Option<f64>,
    pub seed: Option<u64>,
    pub verbose: bool,
    pub quiet: bool,
}

/// Setup logging based on verbosity and the `[logging]` section
pub fn setup_logging(verbose: bool, quiet: bool, logging: &LoggingSection) {
    let log_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    if verbose {
        builder.format_timestamp_millis();
    } else {
        builder.format_target(false).format_timestamp(None);
    }

    if let Some(ref path) = logging.file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder
                    .format_timestamp_millis()
                    .target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => output::print_warning(&format!("Cannot open log file {}: {}", path, e)),
        }
    }

    builder.init();
}

fn load_config(path: Option<&str>) -> Result<ProtoConfig> {
    match path {
        Some(path) => Ok(ProtoConfig::load(path)?),
        None => Ok(ProtoConfig::default()),
    }
}

pub fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    setup_logging(args.verbose, args.quiet, &config.logging);

    if let Some(n) = args.messages {
        config.simulation.messages = n;
    }
    if let Some(p) = args.loss {
        config.simulation.loss_rate = p;
    }
    if let Some(p) = args.reorder {
        config.simulation.reorder_rate = p;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    config.validate()?;

    let opts = SimOptions::from_config(&config)?;
    if !args.quiet {
        println!(
            "Simulating {} messages each way, loss {:.0}%, reorder {:.0}%, seed {}",
            opts.messages,
            opts.loss_rate * 100.0,
            opts.reorder_rate * 100.0,
            opts.seed
        );
    }

    let report = simulate::run(&opts)?;
    if !args.quiet {
        print_report(&report);
    }

    if report.success() {
        output::print_success(&format!(
            "All messages delivered in order after {:.1}s simulated",
            report.elapsed.as_secs_f64()
        ));
        Ok(())
    } else {
        match &report.failure {
            Some(e) => output::print_error(format!("stack failed: {}", e)),
            None => output::print_error("not every message arrived before the tick limit"),
        }
        std::process::exit(2);
    }
}

fn print_report(report: &SimReport) {
    output::print_header("Delivery");
    output::print_field(
        "client -> server",
        format!("{}/{} bytes", report.to_server.received.len(), report.to_server.expected.len()),
    );
    output::print_field(
        "server -> client",
        format!("{}/{} bytes", report.to_client.received.len(), report.to_client.expected.len()),
    );
    output::print_field("ticks", report.ticks);

    output::print_header("Wire");
    output::print_field("dropped", report.dropped);
    output::print_field("reordered", report.reordered);

    for (name, peer) in [("Client", &report.client), ("Server", &report.server)] {
        output::print_header(name);
        output::print_state(peer.state);
        output::print_field("sent ssl", peer.counters.ssl);
        output::print_field("sent raw", peer.counters.raw);
        output::print_field("sent ack", peer.counters.ack);
        output::print_field("retransmitted", peer.counters.retransmit);
    }

    output::print_header("Statistics");
    output::print_field("counters", &report.stats);
    if report.stats.total_errors() == 0 {
        output::print_field("errors", "none");
    }
}

/// Print the example configuration
pub fn cmd_init() -> Result<()> {
    print!("{}", example_config());
    Ok(())
}

/// Load, validate and summarize a configuration
pub fn cmd_check(path: &str) -> Result<()> {
    let config = ProtoConfig::load(path)?;

    output::print_header("Reliability");
    output::print_field("span", config.reliability.span);
    output::print_field(
        "retransmit timeout",
        format!("{} ms", config.reliability.retransmit_timeout_ms),
    );
    output::print_field("max ack list", config.reliability.max_ack_list);

    let replay = config.replay_config();
    output::print_header("Replay");
    output::print_field("window", format!("{} bits", replay.window_bytes * 8));
    output::print_field("expire", format!("{} s", replay.expire.as_secs()));
    output::print_field("packet id form", format!("{:?}", config.packet_id_form()));

    output::print_header("Session");
    output::print_field("cipher", config.session.cipher);
    output::print_field("max fragment", config.session.max_fragment);
    match config.session.key_source() {
        Some(source) => {
            config.key()?;
            output::print_field("key", source);
        }
        None => output::print_warning("No session key configured (key, key_file or OVPN_KEY)"),
    }

    println!();
    output::print_success(&format!("{} is valid", path));
    Ok(())
}
