//! Schema creation and the fixed seed dataset.

use crate::model::{MoveRecord, PokeType, PokemonRecord, TrainerRecord, WinRecord};
use pokegraph_core::{Entity, Error, Result, RowSource, StoreError, StoreErrorKind, insert_sql};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Type names, in id order (ids start at 1).
pub const POKE_TYPES: [&str; 5] = ["Fire", "Water", "Grass", "Electric", "Normal"];

struct PokemonSeed {
    name: &'static str,
    poke_type: &'static str,
    moves: &'static [(&'static str, &'static str)],
    battles: usize,
}

const ROSTER: &[(&str, &[PokemonSeed])] = &[
    (
        "Ash",
        &[
            PokemonSeed {
                name: "Charmander",
                poke_type: "Fire",
                moves: &[("Tackle", "Normal"), ("Ember", "Fire")],
                battles: 7,
            },
            PokemonSeed {
                name: "Bulbasaur",
                poke_type: "Grass",
                moves: &[("Tackle", "Normal"), ("Grass Seed", "Grass")],
                battles: 4,
            },
            PokemonSeed {
                name: "Squirtle",
                poke_type: "Water",
                moves: &[("Tackle", "Normal"), ("Bubble", "Water")],
                battles: 2,
            },
            PokemonSeed {
                name: "Pikachu",
                poke_type: "Electric",
                moves: &[("Tackle", "Normal"), ("Electric Shock", "Electric")],
                battles: 10,
            },
        ],
    ),
    (
        "Misty",
        &[
            PokemonSeed {
                name: "Staryu",
                poke_type: "Water",
                moves: &[("Splash", "Water")],
                battles: 50,
            },
            PokemonSeed {
                name: "Starmie",
                poke_type: "Water",
                moves: &[("Splash", "Water"), ("Takedown", "Normal")],
                battles: 45,
            },
        ],
    ),
];

const TABLES: [&str; 5] = ["win_records", "moves", "pokemon", "poke_types", "trainers"];

const CREATE_TABLES: [&str; 5] = [
    "CREATE TABLE trainers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE poke_types (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE pokemon (\
        id INTEGER PRIMARY KEY, \
        name TEXT NOT NULL, \
        trainer_id INTEGER NOT NULL REFERENCES trainers(id), \
        poke_type_id INTEGER NOT NULL REFERENCES poke_types(id))",
    "CREATE TABLE moves (\
        id INTEGER PRIMARY KEY, \
        name TEXT NOT NULL, \
        pokemon_id INTEGER NOT NULL REFERENCES pokemon(id), \
        damage_type_id INTEGER NOT NULL REFERENCES poke_types(id))",
    "CREATE TABLE win_records (\
        id INTEGER PRIMARY KEY, \
        pokemon_id INTEGER NOT NULL REFERENCES pokemon(id), \
        date_time INTEGER NOT NULL, \
        win INTEGER NOT NULL)",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOptions {
    /// Seed for the win record generator. `None` draws from OS entropy.
    pub rng_seed: Option<u64>,
}

/// Row counts written by [`seed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub trainers: usize,
    pub poke_types: usize,
    pub pokemon: usize,
    pub moves: usize,
    pub win_records: usize,
}

/// Drop and recreate all five tables.
pub fn create_schema(source: &dyn RowSource) -> Result<()> {
    for table in TABLES {
        source.execute(&format!("DROP TABLE IF EXISTS {table}"), &[])?;
    }
    for sql in CREATE_TABLES {
        source.execute(sql, &[])?;
    }
    tracing::info!(target: "pokegraph::seed", tables = TABLES.len(), "schema created");
    Ok(())
}

/// Replace all rows with the seed dataset, in one transaction.
pub fn seed(source: &dyn RowSource, options: SeedOptions) -> Result<SeedSummary> {
    let mut rng = match options.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let now = now_micros()?;

    source.execute("BEGIN", &[])?;
    match write_dataset(source, &mut rng, now) {
        Ok(summary) => {
            source.execute("COMMIT", &[])?;
            tracing::info!(
                target: "pokegraph::seed",
                pokemon = summary.pokemon,
                moves = summary.moves,
                win_records = summary.win_records,
                "seeded"
            );
            Ok(summary)
        }
        Err(err) => {
            if let Err(rollback) = source.execute("ROLLBACK", &[]) {
                tracing::warn!(target: "pokegraph::seed", error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

fn now_micros() -> Result<i64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| {
        Error::Store(StoreError::new(
            StoreErrorKind::Database,
            format!("system clock before Unix epoch: {e}"),
        ))
    })?;
    Ok(i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX))
}

fn insert<E: Entity>(source: &dyn RowSource, record: &E) -> Result<()> {
    source.execute(&insert_sql::<E>(), &record.to_values())?;
    Ok(())
}

fn type_id(name: &str) -> Result<i64> {
    POKE_TYPES
        .iter()
        .position(|t| *t == name)
        .map(|i| i as i64 + 1)
        .ok_or_else(|| Error::Custom(format!("unknown seed type '{name}'")))
}

fn write_dataset(source: &dyn RowSource, rng: &mut StdRng, now: i64) -> Result<SeedSummary> {
    for table in TABLES {
        source.execute(&format!("DELETE FROM {table}"), &[])?;
    }

    let mut summary = SeedSummary::default();
    for (index, name) in POKE_TYPES.iter().enumerate() {
        insert(
            source,
            &PokeType {
                id: index as i64 + 1,
                name: (*name).to_string(),
            },
        )?;
        summary.poke_types += 1;
    }

    for (trainer_index, (trainer_name, roster)) in ROSTER.iter().enumerate() {
        let trainer_id = trainer_index as i64 + 1;
        insert(
            source,
            &TrainerRecord {
                id: trainer_id,
                name: (*trainer_name).to_string(),
            },
        )?;
        summary.trainers += 1;

        for entry in *roster {
            summary.pokemon += 1;
            let pokemon_id = summary.pokemon as i64;
            insert(
                source,
                &PokemonRecord {
                    id: pokemon_id,
                    name: entry.name.to_string(),
                    trainer_id,
                    poke_type_id: type_id(entry.poke_type)?,
                },
            )?;

            for (move_name, damage_type) in entry.moves {
                summary.moves += 1;
                insert(
                    source,
                    &MoveRecord {
                        id: summary.moves as i64,
                        name: (*move_name).to_string(),
                        pokemon_id,
                        damage_type_id: type_id(damage_type)?,
                    },
                )?;
            }

            for _ in 0..entry.battles {
                summary.win_records += 1;
                insert(
                    source,
                    &WinRecord {
                        id: summary.win_records as i64,
                        pokemon_id,
                        date_time: now - rng.gen_range(0..365 * MICROS_PER_DAY),
                        win: rng.gen_bool(0.5),
                    },
                )?;
            }
        }
    }
    Ok(summary)
}
