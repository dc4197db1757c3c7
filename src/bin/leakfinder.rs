//! leakfinder - interactive memory leak finder.
//!
//! Runs named test actions N times and prints how RSS, virtual size and
//! allocated heap moved relative to the startup baseline.
//!
//! Usage:
//!   leakfinder                    # builtins + PostgreSQL probes from PG* env
//!   leakfinder --postgres=false   # builtins only
//!   leakfinder --pid 1234         # watch another process's RSS/VSZ
//!   echo "fetch_all 100" | leakfinder

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, BufReader, IsTerminal, Write};

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use leakfinder::driver;
use leakfinder::input::{ChannelSource, InterruptFlag, LineSource, TerminalEditor};
use leakfinder::probes::{ProbeConfig, register_postgres_probes};
use leakfinder::registry::RegistryBuilder;
use leakfinder::sampler::{JemallocHeap, ProcessSampler, RealFs};
use leakfinder::session::{InteractiveSession, SessionExit};

/// Interactive memory leak finder.
#[derive(Parser)]
#[command(name = "leakfinder", about = "Interactive memory leak finder", version)]
struct Args {
    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Process whose RSS and virtual size are reported (default: this one).
    #[arg(long, default_value = "self")]
    pid: String,

    /// Register the PostgreSQL client probes.
    /// Uses PGUSER or $USER for connection. Disable with --postgres=false.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    postgres: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber on stderr, keeping stdout for reports.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("leakfinder={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Prints a colored PostgreSQL warning with configuration hints.
fn print_pg_warning(error: &str) {
    // ANSI colors: red for error, yellow for hints, reset after
    const RED: &str = "\x1b[1;31m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    eprintln!("{RED}PostgreSQL: {error}{RESET}");
    eprintln!();
    eprintln!("{YELLOW}  Configure connection with environment variables:");
    eprintln!("    export PGHOST=localhost");
    eprintln!("    export PGPORT=5432");
    eprintln!("    export PGUSER=postgres");
    eprintln!("    export PGPASSWORD=secret");
    eprintln!("    export PGDATABASE=postgres");
    eprintln!();
    eprintln!("  PostgreSQL probes will be disabled.{RESET}");
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    // Action panics are caught and reported by the driver; keep them out of
    // the report stream. Anything else is a crash.
    std::panic::set_hook(Box::new(|info| {
        if driver::in_action() {
            debug!("Action panicked: {}", info);
        } else {
            error!("Panic: {}", info);
        }
    }));

    let mut builder = RegistryBuilder::with_builtins();
    if args.postgres {
        match ProbeConfig::from_env() {
            Ok(config) => {
                info!("PostgreSQL probes: enabled, target {}", config.describe());
                if let Err(e) = register_postgres_probes(&mut builder, config) {
                    error!("Failed to register PostgreSQL probes: {}", e);
                    std::process::exit(1);
                }
            }
            Err(e) => {
                warn!("PostgreSQL probes: disabled ({})", e);
                print_pg_warning(&e.to_string());
            }
        }
    } else {
        debug!("PostgreSQL probes: disabled");
    }
    let registry = builder.build();

    let sampler = ProcessSampler::for_pid(
        RealFs::new(),
        &args.proc_path,
        &args.pid,
        JemallocHeap::new(),
    );

    let interrupt = InterruptFlag::new();
    if let Err(e) = interrupt.install_ctrlc_handler() {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let input: Box<dyn LineSource> = if io::stdin().is_terminal() {
        Box::new(TerminalEditor::new(interrupt))
    } else {
        Box::new(ChannelSource::spawn(BufReader::new(io::stdin()), interrupt))
    };

    let session = InteractiveSession::new(registry, sampler, input, io::stdout());
    match session.run() {
        Ok(SessionExit::Quit) => {
            let _ = io::stdout().flush();
            std::process::exit(0);
        }
        Ok(exit) => info!("Session ended: {:?}", exit),
        Err(e) => {
            error!("Session failed: {}", e);
            std::process::exit(1);
        }
    }
}
