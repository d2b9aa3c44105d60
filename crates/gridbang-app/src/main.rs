use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gridbang_app::{
    ConfigOverrides, DEFAULT_TICKS, NoteLog, format_note, load_program, read_config, run_headless,
};
use gridbang_core::GridConfig;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gridbang", version, about = "Run gridbang symbol-grid programs headlessly")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a program, advance it and print every note it emits.
    Run {
        #[command(flatten)]
        grid: GridArgs,
        /// Number of ticks to evaluate.
        #[arg(long, env = "GRIDBANG_TICKS", default_value_t = DEFAULT_TICKS)]
        ticks: u64,
        /// Write a JSON report of the run to this path.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Save the final grid as program text to this path.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Load a program and print the raw cell buffer.
    Dump {
        #[command(flatten)]
        grid: GridArgs,
    },
}

#[derive(Args, Debug)]
struct GridArgs {
    /// Program text file.
    program: PathBuf,
    /// Optional JSON grid configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// RNG seed (defaults to 42 when neither flag nor config sets one).
    #[arg(long, env = "GRIDBANG_SEED")]
    seed: Option<u64>,
}

impl GridArgs {
    fn resolve_config(&self) -> Result<GridConfig> {
        let base = match &self.config {
            Some(path) => read_config(path)?,
            None => GridConfig::default(),
        };
        Ok(ConfigOverrides {
            width: self.width,
            height: self.height,
            seed: self.seed,
        }
        .apply(base))
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            grid,
            ticks,
            report,
            save,
        } => run(&grid, ticks, report, save),
        Command::Dump { grid } => dump(&grid),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

fn run(args: &GridArgs, ticks: u64, report: Option<PathBuf>, save: Option<PathBuf>) -> Result<()> {
    let config = args.resolve_config()?;
    info!(
        width = config.width,
        height = config.height,
        seed = ?config.rng_seed,
        ticks,
        "starting run"
    );
    let log = NoteLog::new();
    let mut grid = load_program(&args.program, config, &log)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_failed = None;
    let outcome = run_headless(&mut grid, &log, ticks, |_, notes| {
        for note in notes {
            if write_failed.is_none() {
                if let Err(err) = writeln!(out, "{}", format_note(note)) {
                    write_failed = Some(err);
                }
            }
        }
    });
    if let Some(err) = write_failed {
        return Err(err).context("failed to write notes to stdout");
    }
    out.flush().context("failed to flush stdout")?;

    if outcome.summary.notes_emitted == 0 {
        warn!("program produced no notes");
    }
    if let Some(path) = report {
        outcome
            .write_json(&path)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    if let Some(path) = save {
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        grid.save_writer(BufWriter::new(file))
            .with_context(|| format!("failed to save grid to {}", path.display()))?;
        info!(path = %path.display(), "grid saved");
    }
    Ok(())
}

fn dump(args: &GridArgs) -> Result<()> {
    let config = args.resolve_config()?;
    let grid = load_program(&args.program, config, &NoteLog::new())?;
    let mut out = io::stdout().lock();
    out.write_all(grid.dump().as_bytes())
        .context("failed to write dump to stdout")?;
    Ok(())
}
