//! The trainer/pokemon entity model.
//!
//! Two layers live here:
//!
//! - **Records** (`TrainerRecord`, `PokemonRecord`, `MoveRecord`, `PokeType`,
//!   `WinRecord`) are flat rows with raw foreign keys. They implement
//!   [`Entity`] and are what the materializer collects.
//! - **Graph types** (`Trainer`, `Pokemon`, `Move`) are shared through `Rc`
//!   and hold resolved references in [`Lazy`] cells.
//!
//! Owning back references are `Weak` (a trainer's pokemon, a move's
//! pokemon), so a graph never forms a strong cycle. Dropping the root list
//! frees everything.

use crate::loader::OnDemandLoader;
use pokegraph_core::{
    DanglingReferenceError, Entity, Error, Lazy, NotLoadedError, PrefixedRow, Result, Value,
};
use serde::Serialize;
use std::fmt;
use std::rc::{Rc, Weak};

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerRecord {
    pub id: i64,
    pub name: String,
}

impl Entity for TrainerRecord {
    const NAME: &'static str = "Trainer";
    const TABLE_NAME: &'static str = "trainers";
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    fn id(&self) -> i64 {
        self.id
    }

    fn from_columns(row: &PrefixedRow<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id), Value::Text(self.name.clone())]
    }
}

/// Shared type taxonomy entry. Used both as a pokemon's primary type and as
/// a move's damage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PokeType {
    pub id: i64,
    pub name: String,
}

impl Entity for PokeType {
    const NAME: &'static str = "PokeType";
    const TABLE_NAME: &'static str = "poke_types";
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    fn id(&self) -> i64 {
        self.id
    }

    fn from_columns(row: &PrefixedRow<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id), Value::Text(self.name.clone())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PokemonRecord {
    pub id: i64,
    pub name: String,
    pub trainer_id: i64,
    pub poke_type_id: i64,
}

impl Entity for PokemonRecord {
    const NAME: &'static str = "Pokemon";
    const TABLE_NAME: &'static str = "pokemon";
    const COLUMNS: &'static [&'static str] = &["id", "name", "trainer_id", "poke_type_id"];

    fn id(&self) -> i64 {
        self.id
    }

    fn from_columns(row: &PrefixedRow<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            trainer_id: row.get("trainer_id")?,
            poke_type_id: row.get("poke_type_id")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.id),
            Value::Text(self.name.clone()),
            Value::BigInt(self.trainer_id),
            Value::BigInt(self.poke_type_id),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub id: i64,
    pub name: String,
    pub pokemon_id: i64,
    pub damage_type_id: i64,
}

impl Entity for MoveRecord {
    const NAME: &'static str = "Move";
    const TABLE_NAME: &'static str = "moves";
    const COLUMNS: &'static [&'static str] = &["id", "name", "pokemon_id", "damage_type_id"];

    fn id(&self) -> i64 {
        self.id
    }

    fn from_columns(row: &PrefixedRow<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            pokemon_id: row.get("pokemon_id")?,
            damage_type_id: row.get("damage_type_id")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.id),
            Value::Text(self.name.clone()),
            Value::BigInt(self.pokemon_id),
            Value::BigInt(self.damage_type_id),
        ]
    }
}

/// One battle outcome. Keeps only the raw pokemon id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinRecord {
    pub id: i64,
    pub pokemon_id: i64,
    /// Microseconds since the Unix epoch.
    pub date_time: i64,
    pub win: bool,
}

impl Entity for WinRecord {
    const NAME: &'static str = "WinRecord";
    const TABLE_NAME: &'static str = "win_records";
    const COLUMNS: &'static [&'static str] = &["id", "pokemon_id", "date_time", "win"];

    fn id(&self) -> i64 {
        self.id
    }

    fn from_columns(row: &PrefixedRow<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            pokemon_id: row.get("pokemon_id")?,
            date_time: row.get("date_time")?,
            win: row.get("win")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.id),
            Value::BigInt(self.pokemon_id),
            Value::Timestamp(self.date_time),
            Value::Bool(self.win),
        ]
    }
}

// ============================================================================
// Graph
// ============================================================================

fn not_loaded(entity: &'static str, id: i64, relation: &'static str) -> Error {
    Error::NotLoaded(NotLoadedError {
        entity,
        id,
        relation,
    })
}

fn require_loader<'a>(
    loader: Option<&'a Rc<OnDemandLoader>>,
    entity: &'static str,
    id: i64,
    relation: &'static str,
) -> Result<&'a OnDemandLoader> {
    loader
        .map(Rc::as_ref)
        .ok_or_else(|| not_loaded(entity, id, relation))
}

pub struct Trainer {
    pub id: i64,
    pub name: String,
    pub(crate) pokemon: Lazy<Vec<Weak<Pokemon>>>,
    pub(crate) loader: Option<Rc<OnDemandLoader>>,
}

impl Trainer {
    pub(crate) fn new(record: TrainerRecord, loader: Option<Rc<OnDemandLoader>>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            pokemon: Lazy::unloaded(),
            loader,
        }
    }

    /// The pokemon this trainer owns within the loaded graph.
    pub fn pokemon(&self) -> Result<Vec<Rc<Pokemon>>> {
        let owned = self.pokemon.get_or_try_load(|| {
            let loader = require_loader(self.loader.as_ref(), "Trainer", self.id, "pokemon")?;
            Ok(loader.pokemon_of(self.id))
        })?;
        Ok(owned.iter().filter_map(Weak::upgrade).collect())
    }

    pub fn is_pokemon_loaded(&self) -> bool {
        self.pokemon.is_loaded()
    }
}

impl fmt::Debug for Trainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pokemon_loaded", &self.pokemon.is_loaded())
            .finish_non_exhaustive()
    }
}

pub struct Pokemon {
    pub id: i64,
    pub name: String,
    pub trainer_id: i64,
    pub poke_type_id: i64,
    pub(crate) trainer: Lazy<Rc<Trainer>>,
    pub(crate) poke_type: Lazy<Rc<PokeType>>,
    pub(crate) moves: Lazy<Vec<Rc<Move>>>,
    pub(crate) win_records: Lazy<Vec<WinRecord>>,
    pub(crate) self_ref: Weak<Pokemon>,
    pub(crate) loader: Option<Rc<OnDemandLoader>>,
}

impl Pokemon {
    pub(crate) fn new(
        record: PokemonRecord,
        self_ref: Weak<Pokemon>,
        loader: Option<Rc<OnDemandLoader>>,
    ) -> Self {
        Self {
            id: record.id,
            name: record.name,
            trainer_id: record.trainer_id,
            poke_type_id: record.poke_type_id,
            trainer: Lazy::unloaded(),
            poke_type: Lazy::unloaded(),
            moves: Lazy::unloaded(),
            win_records: Lazy::unloaded(),
            self_ref,
            loader,
        }
    }

    fn loader(&self, relation: &'static str) -> Result<&OnDemandLoader> {
        require_loader(self.loader.as_ref(), "Pokemon", self.id, relation)
    }

    fn dangling(&self, field: &'static str, target: &'static str, target_id: i64) -> Error {
        Error::DanglingReference(DanglingReferenceError {
            entity: "Pokemon",
            id: self.id,
            field,
            target,
            target_id,
        })
    }

    pub fn trainer(&self) -> Result<&Rc<Trainer>> {
        self.trainer.get_or_try_load(|| {
            self.loader("trainer")?
                .trainer(self.trainer_id)?
                .ok_or_else(|| self.dangling("trainer_id", "Trainer", self.trainer_id))
        })
    }

    pub fn poke_type(&self) -> Result<&Rc<PokeType>> {
        self.poke_type.get_or_try_load(|| {
            self.loader("poke_type")?
                .poke_type(self.poke_type_id)?
                .ok_or_else(|| self.dangling("poke_type_id", "PokeType", self.poke_type_id))
        })
    }

    pub fn moves(&self) -> Result<&[Rc<Move>]> {
        self.moves
            .get_or_try_load(|| {
                self.loader("moves")?
                    .moves_for(self.id, self.self_ref.clone())
            })
            .map(Vec::as_slice)
    }

    pub fn win_records(&self) -> Result<&[WinRecord]> {
        self.win_records
            .get_or_try_load(|| self.loader("win_records")?.win_records_for(self.id))
            .map(Vec::as_slice)
    }

    /// `"wins/total"` over this pokemon's win records.
    pub fn win_string(&self) -> Result<String> {
        let records = self.win_records()?;
        let wins = records.iter().filter(|r| r.win).count();
        Ok(format!("{}/{}", wins, records.len()))
    }

    /// Which relations are already in memory.
    pub fn loaded_relations(&self) -> LoadedRelations {
        LoadedRelations {
            trainer: self.trainer.is_loaded(),
            poke_type: self.poke_type.is_loaded(),
            moves: self.moves.is_loaded(),
            win_records: self.win_records.is_loaded(),
        }
    }
}

impl fmt::Debug for Pokemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pokemon")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trainer_id", &self.trainer_id)
            .field("poke_type_id", &self.poke_type_id)
            .field("loaded", &self.loaded_relations())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadedRelations {
    pub trainer: bool,
    pub poke_type: bool,
    pub moves: bool,
    pub win_records: bool,
}

pub struct Move {
    pub id: i64,
    pub name: String,
    pub pokemon_id: i64,
    pub damage_type_id: i64,
    pub(crate) pokemon: Weak<Pokemon>,
    pub(crate) damage_type: Lazy<Rc<PokeType>>,
    pub(crate) loader: Option<Rc<OnDemandLoader>>,
}

impl Move {
    pub(crate) fn new(
        record: MoveRecord,
        pokemon: Weak<Pokemon>,
        loader: Option<Rc<OnDemandLoader>>,
    ) -> Self {
        Self {
            id: record.id,
            name: record.name,
            pokemon_id: record.pokemon_id,
            damage_type_id: record.damage_type_id,
            pokemon,
            damage_type: Lazy::unloaded(),
            loader,
        }
    }

    /// The owning pokemon, if the graph is still alive.
    pub fn pokemon(&self) -> Option<Rc<Pokemon>> {
        self.pokemon.upgrade()
    }

    pub fn damage_type(&self) -> Result<&Rc<PokeType>> {
        self.damage_type.get_or_try_load(|| {
            require_loader(self.loader.as_ref(), "Move", self.id, "damage_type")?
                .poke_type(self.damage_type_id)?
                .ok_or_else(|| {
                    Error::DanglingReference(DanglingReferenceError {
                        entity: "Move",
                        id: self.id,
                        field: "damage_type_id",
                        target: "PokeType",
                        target_id: self.damage_type_id,
                    })
                })
        })
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Move")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pokemon_id", &self.pokemon_id)
            .field("damage_type", &self.damage_type.get())
            .finish_non_exhaustive()
    }
}

/// The result of one strategy invocation: every pokemon, in id order.
///
/// Holding the graph keeps all trainers, types and moves alive.
#[derive(Debug, Default)]
pub struct PokemonGraph {
    pokemon: Vec<Rc<Pokemon>>,
}

impl PokemonGraph {
    pub(crate) fn new(pokemon: Vec<Rc<Pokemon>>) -> Self {
        Self { pokemon }
    }

    pub fn pokemon(&self) -> &[Rc<Pokemon>] {
        &self.pokemon
    }

    pub fn len(&self) -> usize {
        self.pokemon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pokemon.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Rc<Pokemon>> {
        self.pokemon.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rc<Pokemon>> {
        self.pokemon.iter()
    }
}

impl<'a> IntoIterator for &'a PokemonGraph {
    type Item = &'a Rc<Pokemon>;
    type IntoIter = std::slice::Iter<'a, Rc<Pokemon>>;

    fn into_iter(self) -> Self::IntoIter {
        self.pokemon.iter()
    }
}
