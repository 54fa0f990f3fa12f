//! Benchmark configuration.
//!
//! Values come from the environment first; command-line flags override
//! them.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `POKEGRAPH_DATABASE` | SQLite path | `:memory:` |
//! | `POKEGRAPH_ITERATIONS` | Iterations per strategy | `100` |
//! | `POKEGRAPH_RNG_SEED` | Seed for win record generation | random |

use pokegraph_core::{ConfigError, Error, Result};
use std::env;
use std::str::FromStr;

pub const DEFAULT_ITERATIONS: usize = 100;
pub const DEFAULT_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub database: String,
    pub iterations: usize,
    pub rng_seed: Option<u64>,
    /// Use the tables as they are instead of recreating them.
    pub skip_seed: bool,
    /// Print every strategy's graph once before timing it.
    pub show: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            iterations: DEFAULT_ITERATIONS,
            rng_seed: None,
            skip_seed: false,
            show: false,
        }
    }
}

impl BenchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(database) = lookup("POKEGRAPH_DATABASE").filter(|v| !v.trim().is_empty()) {
            config.database = database;
        }
        if let Some(raw) = lookup("POKEGRAPH_ITERATIONS") {
            config.iterations = parse_var("POKEGRAPH_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("POKEGRAPH_RNG_SEED") {
            config.rng_seed = Some(parse_var("POKEGRAPH_RNG_SEED", &raw)?);
        }
        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == DEFAULT_DATABASE
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::Config(ConfigError {
            message: format!("{name}: invalid value '{raw}'"),
            source: Some(Box::new(e)),
        })
    })
}
