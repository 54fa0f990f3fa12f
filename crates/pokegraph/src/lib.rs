//! Object graph materialization strategies for a trainer/pokemon dataset.
//!
//! Loads trainers, their pokemon, each pokemon's moves and win records, and
//! the shared type taxonomy from a relational store, and rebuilds them as a
//! deduplicated, cross-referenced graph. Five retrieval strategies trade
//! round trips against transferred rows; the timing harness compares them.
//!
//! ```ignore
//! use pokegraph::prelude::*;
//!
//! let conn = SqliteConnection::open_memory()?;
//! create_schema(&conn)?;
//! seed(&conn, SeedOptions::default())?;
//!
//! let source: Rc<dyn RowSource> = Rc::new(conn);
//! let graph = Strategy::EagerFull.load(&source, LoadOptions::default())?;
//! for pokemon in &graph {
//!     println!("{}", pokemon_stats(pokemon)?);
//! }
//! ```

pub mod config;
pub mod harness;
pub mod loader;
pub mod materialize;
pub mod model;
pub mod report;
pub mod seed;
pub mod strategy;

pub use config::BenchConfig;
pub use harness::{Progress, TimingHarness, TimingReport, print_graph, progress_step, run_strategy};
pub use loader::OnDemandLoader;
pub use materialize::{GraphBuilder, Includes, RowSet, materialize_joined, materialize_sets};
pub use model::{
    LoadedRelations, Move, MoveRecord, PokeType, Pokemon, PokemonGraph, PokemonRecord, Trainer,
    TrainerRecord, WinRecord,
};
pub use report::{GraphSnapshot, PokemonSnapshot, pokemon_stats, print_pokemon_stats};
pub use seed::{SeedOptions, SeedSummary, create_schema, seed};
pub use strategy::{LoadOptions, Strategy};

pub use pokegraph_console::{Console, OutputMode};
pub use pokegraph_core::{Error, Result, RowSource};
pub use pokegraph_session::{RoundTripStats, TrackedSource};
pub use pokegraph_sqlite::{SqliteConfig, SqliteConnection};

/// Everything needed to load and time graphs.
pub mod prelude {
    pub use crate::{
        BenchConfig, Console, Error, GraphSnapshot, Includes, LoadOptions, OutputMode,
        PokemonGraph, Result, RowSource, SeedOptions, SqliteConnection, Strategy, TimingHarness,
        TrackedSource, create_schema, pokemon_stats, seed,
    };
    pub use std::rc::Rc;
}
