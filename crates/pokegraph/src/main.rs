use clap::Parser;
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use pokegraph::{
    BenchConfig, Console, Error, LoadOptions, OutputMode, Result, RowSource, SeedOptions,
    SqliteConnection, Strategy, TimingHarness, create_schema, print_graph, seed,
};

#[derive(Parser)]
#[command(name = "pokegraph")]
#[command(about = "Compare object graph loading strategies on a pokemon dataset")]
#[command(version)]
struct Cli {
    /// SQLite database path (default: in-memory, or POKEGRAPH_DATABASE)
    #[arg(short, long)]
    database: Option<String>,

    /// Iterations per strategy (default: 100, or POKEGRAPH_ITERATIONS)
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Strategy to run; repeat for several (default: all)
    #[arg(short, long = "strategy")]
    strategies: Vec<Strategy>,

    /// Seed for win record generation (default: random, or POKEGRAPH_RNG_SEED)
    #[arg(long)]
    rng_seed: Option<u64>,

    /// Keep existing tables instead of recreating and seeding them
    #[arg(long)]
    skip_seed: bool,

    /// Print each strategy's graph once before timing it
    #[arg(long)]
    show: bool,

    /// Output mode: plain, rich, json, quiet (default: auto-detect)
    #[arg(long)]
    output: Option<OutputMode>,
}

impl Cli {
    fn apply(&self, mut config: BenchConfig) -> BenchConfig {
        if let Some(database) = &self.database {
            config.database.clone_from(database);
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if self.rng_seed.is_some() {
            config.rng_seed = self.rng_seed;
        }
        config.skip_seed |= self.skip_seed;
        config.show |= self.show;
        config
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(config: &BenchConfig) -> Result<SqliteConnection> {
    if config.is_in_memory() {
        SqliteConnection::open_memory()
    } else {
        SqliteConnection::open_file(config.database.clone())
    }
}

fn run(cli: &Cli, console: &Console) -> Result<()> {
    let config = cli.apply(BenchConfig::from_env()?);
    let conn = open(&config)?;

    if config.skip_seed {
        console.status(&format!("using existing data in {}", config.database));
    } else {
        create_schema(&conn)?;
        let summary = seed(
            &conn,
            SeedOptions {
                rng_seed: config.rng_seed,
            },
        )?;
        console.status(&format!(
            "seeded {} trainers, {} pokemon, {} moves, {} win records",
            summary.trainers, summary.pokemon, summary.moves, summary.win_records
        ));
    }

    let source: Rc<dyn RowSource> = Rc::new(conn);
    let strategies = if cli.strategies.is_empty() {
        Strategy::ALL.to_vec()
    } else {
        cli.strategies.clone()
    };

    let mut results = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        if config.show {
            console.rule(Some(strategy.name()));
            let graph = strategy.load(&source, LoadOptions::default())?;
            print_graph(console, &graph)?;
        }
        let report = TimingHarness::new(console).run_strategy(
            strategy,
            &source,
            LoadOptions::default(),
            config.iterations,
        )?;
        console.success(&report.summary(strategy.name()));
        results.push(serde_json::json!({
            "strategy": strategy.name(),
            "iterations": report.iterations,
            "total_ms": report.total_ms(),
            "per_iteration_ms": report.per_iteration_ms(),
        }));
    }

    if console.mode().is_structured() {
        console
            .print_json(&results)
            .map_err(|e| Error::Custom(format!("failed to encode results: {e}")))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let console = cli.output.map_or_else(Console::new, Console::with_mode);
    match run(&cli, &console) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            console.error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
