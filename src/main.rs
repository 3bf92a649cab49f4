use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};

use cyclerun::cycles::{self, Action, CycleStore};
use cyclerun::display;
use cyclerun::executor::{Engine, EnigoDriver, RunOutcome, RunRequest};

/// Cyclerun CLI
#[derive(Debug, Parser)]
#[command(
    name = cyclerun::PKG_NAME,
    version = cyclerun::PKG_VERSION,
    about = "A cycle-based pointer automation sequencer built on Enigo"
)]
struct Args {
    /// Path to the JSON cycle file
    #[arg(short = 'f', long = "file", default_value = "cycles.json")]
    file: PathBuf,

    /// Enable dry-run mode (log clicks instead of simulating input)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for the cycle file and exit
    #[arg(long = "print-schema")]
    print_schema: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the saved cycles
    List,

    /// Show the actions of one saved cycle
    Show { index: usize },

    /// Save a new cycle from action literals (`click:X,Y` and `sleep:SECS`)
    Add {
        name: String,

        /// Action literals, in replay order
        #[arg(required = true)]
        actions: Vec<String>,

        /// Treat click coordinates as logical pixels and normalize them
        /// against the connected displays
        #[arg(long)]
        logical: bool,
    },

    /// Rename a saved cycle
    Rename { index: usize, name: String },

    /// Delete a saved cycle
    Delete { index: usize },

    /// Replay a saved cycle's actions
    Run {
        index: usize,

        /// Number of times to repeat the action list
        #[arg(long, default_value_t = 1)]
        cycles: u32,

        /// Fixed pause after every action, in milliseconds
        #[arg(long = "delay-ms", default_value_t = 500)]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Honor --log-level by initializing tracing before anything logs.
    if let Some(level) = &args.log_level {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        };
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }
    if args.log_level.is_none() {
        cyclerun::init_tracing();
    }
    info!(
        version = cyclerun::PKG_VERSION,
        file = %args.file.display(),
        dry_run = args.dry_run,
        "Starting cyclerun"
    );

    if args.print_schema {
        let schema = cycles::collection_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    let mut store = CycleStore::open(&args.file);

    match args.command {
        None | Some(Command::List) => list(&store),
        Some(Command::Show { index }) => show(&store, index)?,
        Some(Command::Add {
            name,
            actions,
            logical,
        }) => add(&mut store, name, &actions, logical)?,
        Some(Command::Rename { index, name }) => store
            .rename(index, name)
            .context("failed to persist the rename")?,
        Some(Command::Delete { index }) => store
            .delete(index)
            .context("failed to persist the deletion")?,
        Some(Command::Run {
            index,
            cycles,
            delay_ms,
        }) => run(&store, index, cycles, delay_ms, args.dry_run).await?,
    }

    Ok(())
}

fn list(store: &CycleStore) {
    if store.is_empty() {
        println!("no saved cycles in {}", store.path().display());
        return;
    }
    for (index, cycle) in store.cycles().iter().enumerate() {
        println!("{index:3}  {}  ({} actions)", cycle.name, cycle.actions.len());
    }
}

fn show(store: &CycleStore, index: usize) -> anyhow::Result<()> {
    let Some(cycle) = store.get(index) else {
        bail!("no cycle at index {index} (have {})", store.len());
    };
    println!("{}", cycle.name);
    for (i, action) in cycle.actions.iter().enumerate() {
        println!("{i:3}  {action}");
    }
    Ok(())
}

fn add(
    store: &mut CycleStore,
    name: String,
    literals: &[String],
    logical: bool,
) -> anyhow::Result<()> {
    let mut actions = literals
        .iter()
        .map(|literal| parse_action(literal))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if logical {
        let displays = display::query_displays();
        for action in &mut actions {
            if let Action::Click { x, y } = action {
                (*x, *y) = display::normalize(*x, *y, &displays);
            }
        }
    }

    let count = actions.len();
    store
        .add(name, &actions)
        .context("failed to persist the new cycle")?;
    println!("saved cycle #{} with {count} action(s)", store.len() - 1);
    Ok(())
}

/// Parse an action literal: `click:X,Y` or `sleep:SECS`.
fn parse_action(literal: &str) -> anyhow::Result<Action> {
    let Some((kind, rest)) = literal.split_once(':') else {
        bail!("malformed action '{literal}', expected click:X,Y or sleep:SECS");
    };
    match kind {
        "click" => {
            let Some((x, y)) = rest.split_once(',') else {
                bail!("malformed click '{literal}', expected click:X,Y");
            };
            Ok(Action::Click {
                x: x.trim()
                    .parse()
                    .with_context(|| format!("bad x coordinate in '{literal}'"))?,
                y: y.trim()
                    .parse()
                    .with_context(|| format!("bad y coordinate in '{literal}'"))?,
            })
        }
        "sleep" => Ok(Action::Sleep {
            seconds: rest
                .trim()
                .parse()
                .with_context(|| format!("bad duration in '{literal}'"))?,
        }),
        other => bail!("unknown action kind '{other}'"),
    }
}

async fn run(
    store: &CycleStore,
    index: usize,
    cycles: u32,
    delay_ms: u64,
    dry_run: bool,
) -> anyhow::Result<()> {
    let Some(cycle) = store.get(index) else {
        bail!("no cycle at index {index} (have {})", store.len());
    };
    let request = RunRequest::new(&cycle.actions, cycles, Duration::from_millis(delay_ms));
    let engine = Engine::new(Box::new(EnigoDriver::new(dry_run)));

    // Log view: render every run event as it arrives.
    let mut rx = engine.subscribe();
    let log_view = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(target: "cyclerun::run", "{event}"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(target: "cyclerun::run", missed, "Log view fell behind; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut handle = engine.start(request)?;

    // Ctrl+C cancels the run instead of killing the process mid-click.
    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling run");
            canceller.cancel();
        }
    });

    let outcome = handle.wait().await;
    drop(engine); // closes the event channel so the log view drains and exits
    log_view.await.context("event log task failed")?;

    match outcome {
        RunOutcome::Completed => info!("Run completed"),
        RunOutcome::Cancelled => warn!("Run cancelled"),
        RunOutcome::Failed => bail!("run aborted by a pointer automation failure"),
    }
    Ok(())
}
