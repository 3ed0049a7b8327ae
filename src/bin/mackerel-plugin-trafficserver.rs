//! mackerel-plugin-trafficserver - Traffic Server metrics plugin.
//!
//! One-shot collector for mackerel-agent: queries the local Traffic Server
//! via `traffic_ctl`, prints metric values (or the graph schema when
//! `MACKEREL_AGENT_PLUGIN_META` is set) on stdout, and exits. Diagnostics
//! go to stderr; stdout carries only the plugin protocol.

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;

use mp_trafficserver::collector::TrafficCtl;
use mp_trafficserver::plugin::Plugin;

/// Traffic Server metrics plugin for mackerel-agent.
#[derive(Parser)]
#[command(
    name = "mackerel-plugin-trafficserver",
    about = "Traffic Server metrics plugin for mackerel-agent",
    version
)]
struct Args {
    /// Temp file name for storing the previous run's values.
    /// Default: MACKEREL_PLUGIN_WORKDIR or the system temp directory.
    #[arg(long, value_name = "PATH")]
    tempfile: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    /// Default is warn level; a healthy run stays silent on stderr.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber once, at process start, writing to
/// stderr so the metric output on stdout stays clean.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mp_trafficserver={}", level).parse().unwrap())
        .add_directive(
            format!("mackerel_plugin_trafficserver={}", level)
                .parse()
                .unwrap(),
        );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let plugin = Plugin::new(TrafficCtl::new(), args.tempfile.as_deref());

    let stdout = std::io::stdout();
    if let Err(e) = plugin.run(&mut stdout.lock()) {
        error!("{}", e);
        std::process::exit(1);
    }
}
