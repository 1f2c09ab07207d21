//! Settle CLI
//!
//! Small demonstrations of the settle promise library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settle::config::{self, Hook, RejectionHandler, Settings};
use settle::{event_loop, Promise, Reason, VERSION};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "settle")]
#[command(author, version, about = "Promises/A+ promises with long traces and unhandled-rejection detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (JSON) applied before running
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a long `.then()` chain in one flush
    Chain {
        /// Number of chained callbacks
        #[arg(long, default_value_t = 100_000)]
        depth: usize,
    },

    /// Print the long trace of a failure several hops deep
    Trace {
        /// Number of `.then()` hops before the failure
        #[arg(long, default_value_t = 3)]
        hops: usize,
    },

    /// Show unhandled and possibly-unhandled rejection reporting
    Unhandled,

    /// Race timers on the virtual-time event loop
    Race {
        /// Timer delays in milliseconds, one contender each
        #[arg(long, num_args = 1.., default_values_t = [30u64, 10, 20])]
        delays: Vec<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Some(path) = &cli.config {
        let settings = lift(Settings::load(path))
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        settings.apply();
    }

    info!(version = VERSION, "settle starting");

    match cli.command {
        Commands::Chain { depth } => run_chain(depth),
        Commands::Trace { hops } => run_trace(hops),
        Commands::Unhandled => run_unhandled(),
        Commands::Race { delays } => run_race(&delays),
    }
}

/// Library errors are `!Send`; `anyhow` gets their text
fn lift<T>(result: settle::Result<T>) -> Result<T> {
    result.map_err(|err| anyhow::anyhow!("{}", err))
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_chain(depth: usize) -> Result<()> {
    let start = Instant::now();
    let root = Promise::<u64>::defer();
    let mut tail = root.promise.clone();
    for _ in 0..depth {
        tail = tail.then(|v: u64| Ok(v + 1));
    }
    root.resolve.call(0);
    lift(settle::flush())?;
    println!(
        "chain of {} callbacks settled to {} in {:?}",
        depth,
        lift(tail.value())?,
        start.elapsed()
    );
    Ok(())
}

fn run_trace(hops: usize) -> Result<()> {
    settle::set_long_traces(true);
    let mut tail: Promise<usize> = Promise::resolve(0);
    for _ in 0..hops {
        tail = tail.then(|v: usize| Ok(v + 1));
    }
    let failed: Promise<usize> = tail.then(|v: usize| {
        Err::<usize, _>(Reason::msg(format!("failed after {} hops", v)))
    });
    let caught = failed.catch(|reason| {
        println!("{}", reason.stack());
        Ok(0)
    });
    lift(settle::flush())?;
    lift(caught.value())?;
    Ok(())
}

fn run_unhandled() -> Result<()> {
    config::on_possibly_unhandled_rejection(Hook::<RejectionHandler>::handler(|reason, id| {
        println!("possibly unhandled: {} ({})", reason, id);
    }));
    config::on_possibly_unhandled_rejection_handled(Hook::<RejectionHandler>::handler(
        |reason, id| println!("handled later: {} ({})", reason, id),
    ));

    let late: Promise<i32> = Promise::reject(Reason::msg("nobody listened yet"));
    lift(settle::flush())?;
    let recovered = late.catch(|_| Ok(0));
    lift(settle::flush())?;
    println!("recovered with {}", lift(recovered.value())?);

    let fatal: Promise<i32> = Promise::reject(Reason::msg("fatal"));
    fatal.done();
    match settle::flush() {
        Err(settle::Error::Unhandled(unhandled)) => println!("{}", unhandled.stack()),
        other => lift(other)?,
    }
    config::reset();
    Ok(())
}

fn run_race(delays: &[u64]) -> Result<()> {
    let contenders: Vec<Promise<usize>> = delays
        .iter()
        .enumerate()
        .map(|(index, &ms)| Promise::delayed(index, ms))
        .collect();
    let winner = Promise::race(contenders);
    winner.done_then(|index| {
        println!("contender {} won", index);
        Ok(())
    });
    let run = lift(event_loop::run())?;
    println!(
        "{} macrotasks, virtual time {}ms",
        run.macrotasks_processed, run.final_time
    );
    Ok(())
}
