//! Graph materialization.
//!
//! Rows are turned into a graph in two passes:
//!
//! 1. **Absorb**: every entity column group in every row becomes a flat
//!    record in an [`IdentityMap`]. A record seen again refreshes the
//!    stored one, so a wide join that repeats a pokemon on every row still
//!    yields a single pokemon.
//! 2. **Link**: records become `Rc` graph entities, and every foreign key
//!    named by the [`Includes`] is resolved through the identity map. A key
//!    that points at nothing fails with [`DanglingReferenceError`].
//!
//! Joined-row mode feeds one wide row sequence into pass 1; multi-set mode
//! feeds several independently fetched row sets. Pass 2 is shared, so row
//! and set order never change the resulting graph, only collection order.
//!
//! # Column groups
//!
//! | Prefix | Entity |
//! |--------|--------|
//! | `p_`   | Pokemon |
//! | `t_`   | Trainer |
//! | `pt_`  | PokeType (primary) |
//! | `m_`   | Move |
//! | `dt_`  | PokeType (damage) |
//! | `w_`   | WinRecord |

use crate::loader::OnDemandLoader;
use crate::model::{
    Move, MoveRecord, PokeType, Pokemon, PokemonGraph, PokemonRecord, Trainer, TrainerRecord,
    WinRecord,
};
use pokegraph_core::{DanglingReferenceError, Entity, Error, Result, Row, TypeError};
use pokegraph_session::IdentityMap;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub const POKEMON_PREFIX: &str = "p_";
pub const TRAINER_PREFIX: &str = "t_";
pub const POKE_TYPE_PREFIX: &str = "pt_";
pub const MOVE_PREFIX: &str = "m_";
pub const DAMAGE_TYPE_PREFIX: &str = "dt_";
pub const WIN_RECORD_PREFIX: &str = "w_";

/// Relations the link pass resolves eagerly.
///
/// Anything not included stays unloaded and goes to the on-demand loader,
/// if one is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Includes {
    pub trainer: bool,
    pub poke_type: bool,
    pub moves: bool,
    pub move_damage_types: bool,
    pub win_records: bool,
}

impl Includes {
    pub const fn none() -> Self {
        Self {
            trainer: false,
            poke_type: false,
            moves: false,
            move_damage_types: false,
            win_records: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            trainer: true,
            poke_type: true,
            moves: true,
            move_damage_types: true,
            win_records: true,
        }
    }

    pub const fn trainer(mut self) -> Self {
        self.trainer = true;
        self
    }

    pub const fn poke_type(mut self) -> Self {
        self.poke_type = true;
        self
    }

    pub const fn moves(mut self) -> Self {
        self.moves = true;
        self
    }

    /// Damage types imply moves.
    pub const fn move_damage_types(mut self) -> Self {
        self.moves = true;
        self.move_damage_types = true;
        self
    }

    pub const fn win_records(mut self) -> Self {
        self.win_records = true;
        self
    }
}

/// One independently fetched row set for multi-set mode.
///
/// A `Pokemon` set may also carry `t_` and `pt_` groups; a `Moves` set may
/// carry a `dt_` group.
#[derive(Debug, Clone, Copy)]
pub enum RowSet<'a> {
    Pokemon(&'a [Row]),
    PokeTypes(&'a [Row]),
    Moves(&'a [Row]),
    WinRecords(&'a [Row]),
}

/// Collects records from rows, then links them into a graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    records: IdentityMap,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct records absorbed so far.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn upsert<T: Entity>(&mut self, record: T) {
        let id = record.id();
        if let Some(slot) = self.records.get_mut::<T>(id) {
            *slot = record;
            return;
        }
        self.records.get_or_create(id, || record);
    }

    /// Absorb the `prefix` group of `row` as a `T`.
    ///
    /// An all-NULL group (an outer join with no match) is skipped. A group
    /// whose key column is missing entirely is an error: the caller asked
    /// for a relation the query never selected.
    fn absorb_group<T: Entity>(&mut self, row: &Row, prefix: &str) -> Result<()> {
        let group = row.prefixed(prefix);
        if !group.has_column("id") {
            return Err(Error::Type(TypeError {
                expected: T::NAME,
                actual: format!("no '{prefix}' column group in row"),
                column: Some(format!("{prefix}id")),
                rust_type: Some(std::any::type_name::<T>()),
            }));
        }
        if group.is_present("id") {
            self.upsert(T::from_columns(&group)?);
        }
        Ok(())
    }

    /// Absorb the group only when the row selected it.
    fn absorb_if_selected<T: Entity>(&mut self, row: &Row, prefix: &str) -> Result<()> {
        if row.prefixed(prefix).has_column("id") {
            self.absorb_group::<T>(row, prefix)?;
        }
        Ok(())
    }

    /// Absorb one wide row: the pokemon plus every included relation group.
    pub fn absorb_joined_row(&mut self, row: &Row, includes: Includes) -> Result<()> {
        let pokemon = PokemonRecord::from_columns(&row.prefixed(POKEMON_PREFIX))?;
        self.upsert(pokemon);

        if includes.trainer {
            self.absorb_group::<TrainerRecord>(row, TRAINER_PREFIX)?;
        }
        if includes.poke_type {
            self.absorb_group::<PokeType>(row, POKE_TYPE_PREFIX)?;
        }
        if includes.moves {
            self.absorb_group::<MoveRecord>(row, MOVE_PREFIX)?;
        }
        if includes.move_damage_types {
            self.absorb_group::<PokeType>(row, DAMAGE_TYPE_PREFIX)?;
        }
        if includes.win_records {
            self.absorb_group::<WinRecord>(row, WIN_RECORD_PREFIX)?;
        }
        Ok(())
    }

    /// Absorb one independently fetched row set.
    pub fn absorb_set(&mut self, set: RowSet<'_>) -> Result<()> {
        match set {
            RowSet::Pokemon(rows) => {
                for row in rows {
                    self.upsert(PokemonRecord::from_columns(&row.prefixed(POKEMON_PREFIX))?);
                    self.absorb_if_selected::<TrainerRecord>(row, TRAINER_PREFIX)?;
                    self.absorb_if_selected::<PokeType>(row, POKE_TYPE_PREFIX)?;
                }
            }
            RowSet::PokeTypes(rows) => {
                for row in rows {
                    self.absorb_group::<PokeType>(row, POKE_TYPE_PREFIX)?;
                }
            }
            RowSet::Moves(rows) => {
                for row in rows {
                    self.absorb_group::<MoveRecord>(row, MOVE_PREFIX)?;
                    self.absorb_if_selected::<PokeType>(row, DAMAGE_TYPE_PREFIX)?;
                }
            }
            RowSet::WinRecords(rows) => {
                for row in rows {
                    self.absorb_group::<WinRecord>(row, WIN_RECORD_PREFIX)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve all included references and build the graph.
    pub fn link(
        self,
        includes: Includes,
        loader: Option<Rc<OnDemandLoader>>,
    ) -> Result<PokemonGraph> {
        let records = self.records;
        let mut links = IdentityMap::new();

        for record in records.values::<PokeType>() {
            links.get_or_create(record.id, || Rc::new(record.clone()));
        }

        for record in records.values::<TrainerRecord>() {
            let trainer = Rc::new(Trainer::new(record.clone(), loader.clone()));
            links.get_or_create(record.id, || trainer);
        }

        let mut roots = Vec::with_capacity(records.len_of::<PokemonRecord>());
        for record in records.values::<PokemonRecord>() {
            let pokemon = Rc::new_cyclic(|weak| {
                Pokemon::new(record.clone(), weak.clone(), loader.clone())
            });

            if includes.trainer {
                let trainer = resolve::<Rc<Trainer>>(&links, Reference {
                    entity: "Pokemon",
                    id: record.id,
                    field: "trainer_id",
                    target: "Trainer",
                    target_id: record.trainer_id,
                })?;
                let _ = pokemon.trainer.set_loaded(trainer);
            }
            if includes.poke_type {
                let poke_type = resolve::<Rc<PokeType>>(&links, Reference {
                    entity: "Pokemon",
                    id: record.id,
                    field: "poke_type_id",
                    target: "PokeType",
                    target_id: record.poke_type_id,
                })?;
                let _ = pokemon.poke_type.set_loaded(poke_type);
            }

            links.insert_unique(PokemonRecord::NAME, record.id, Rc::clone(&pokemon))?;
            roots.push(pokemon);
        }

        if includes.moves {
            let mut by_pokemon: HashMap<i64, Vec<Rc<Move>>> = HashMap::new();
            for record in records.values::<MoveRecord>() {
                let owner = resolve::<Rc<Pokemon>>(&links, Reference {
                    entity: "Move",
                    id: record.id,
                    field: "pokemon_id",
                    target: "Pokemon",
                    target_id: record.pokemon_id,
                })?;
                let item = Move::new(record.clone(), Rc::downgrade(&owner), loader.clone());
                if includes.move_damage_types {
                    let damage_type = resolve::<Rc<PokeType>>(&links, Reference {
                        entity: "Move",
                        id: record.id,
                        field: "damage_type_id",
                        target: "PokeType",
                        target_id: record.damage_type_id,
                    })?;
                    let _ = item.damage_type.set_loaded(damage_type);
                }
                by_pokemon.entry(owner.id).or_default().push(Rc::new(item));
            }
            for pokemon in &roots {
                let moves = by_pokemon.remove(&pokemon.id).unwrap_or_default();
                let _ = pokemon.moves.set_loaded(moves);
            }
        }

        if includes.win_records {
            let mut by_pokemon: HashMap<i64, Vec<WinRecord>> = HashMap::new();
            for record in records.values::<WinRecord>() {
                resolve::<Rc<Pokemon>>(&links, Reference {
                    entity: "WinRecord",
                    id: record.id,
                    field: "pokemon_id",
                    target: "Pokemon",
                    target_id: record.pokemon_id,
                })?;
                by_pokemon
                    .entry(record.pokemon_id)
                    .or_default()
                    .push(record.clone());
            }
            for pokemon in &roots {
                let wins = by_pokemon.remove(&pokemon.id).unwrap_or_default();
                let _ = pokemon.win_records.set_loaded(wins);
            }
        }

        if includes.trainer {
            let mut owned: HashMap<i64, Vec<Weak<Pokemon>>> = HashMap::new();
            for pokemon in &roots {
                owned
                    .entry(pokemon.trainer_id)
                    .or_default()
                    .push(Rc::downgrade(pokemon));
            }
            for trainer in links.values::<Rc<Trainer>>() {
                let list = owned.remove(&trainer.id).unwrap_or_default();
                let _ = trainer.pokemon.set_loaded(list);
            }
        }

        if let Some(loader) = &loader {
            for poke_type in links.values::<Rc<PokeType>>() {
                loader.register_poke_type(poke_type);
            }
            for trainer in links.values::<Rc<Trainer>>() {
                loader.register_trainer(trainer);
            }
            for pokemon in &roots {
                loader.register_pokemon(pokemon);
            }
        }

        roots.sort_by_key(|p| p.id);
        tracing::debug!(
            target: "pokegraph::materialize",
            pokemon = roots.len(),
            trainers = links.len_of::<Rc<Trainer>>(),
            poke_types = links.len_of::<Rc<PokeType>>(),
            moves = records.len_of::<MoveRecord>(),
            win_records = records.len_of::<WinRecord>(),
            on_demand = loader.is_some(),
            "materialized graph"
        );
        Ok(PokemonGraph::new(roots))
    }
}

struct Reference {
    entity: &'static str,
    id: i64,
    field: &'static str,
    target: &'static str,
    target_id: i64,
}

fn resolve<T: Clone + 'static>(links: &IdentityMap, reference: Reference) -> Result<T> {
    links.get::<T>(reference.target_id).cloned().ok_or_else(|| {
        Error::DanglingReference(DanglingReferenceError {
            entity: reference.entity,
            id: reference.id,
            field: reference.field,
            target: reference.target,
            target_id: reference.target_id,
        })
    })
}

/// Build a graph from one wide row sequence.
pub fn materialize_joined(
    rows: &[Row],
    includes: Includes,
    loader: Option<Rc<OnDemandLoader>>,
) -> Result<PokemonGraph> {
    let mut builder = GraphBuilder::new();
    for row in rows {
        builder.absorb_joined_row(row, includes)?;
    }
    builder.link(includes, loader)
}

/// Build a graph from several independently fetched row sets.
pub fn materialize_sets(
    sets: &[RowSet<'_>],
    includes: Includes,
    loader: Option<Rc<OnDemandLoader>>,
) -> Result<PokemonGraph> {
    let mut builder = GraphBuilder::new();
    for set in sets {
        builder.absorb_set(*set)?;
    }
    builder.link(includes, loader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokegraph_core::Value;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    const JOINED: &[&str] = &[
        "p_id",
        "p_name",
        "p_trainer_id",
        "p_poke_type_id",
        "t_id",
        "t_name",
        "pt_id",
        "pt_name",
        "m_id",
        "m_name",
        "m_pokemon_id",
        "m_damage_type_id",
        "dt_id",
        "dt_name",
    ];

    fn joined_row(move_id: i64, move_name: &str, damage: (i64, &str)) -> Row {
        Row::new(
            cols(JOINED),
            vec![
                Value::BigInt(1),
                text("Charmander"),
                Value::BigInt(1),
                Value::BigInt(1),
                Value::BigInt(1),
                text("Ash"),
                Value::BigInt(1),
                text("Fire"),
                Value::BigInt(move_id),
                text(move_name),
                Value::BigInt(1),
                Value::BigInt(damage.0),
                Value::BigInt(damage.0),
                text(damage.1),
            ],
        )
    }

    fn joined_includes() -> Includes {
        Includes::none().trainer().poke_type().move_damage_types()
    }

    #[test]
    fn test_shared_parent_collapses_to_one_instance() {
        let rows = vec![
            joined_row(1, "Tackle", (5, "Normal")),
            joined_row(2, "Ember", (1, "Fire")),
            joined_row(3, "Scratch", (5, "Normal")),
        ];
        let graph = materialize_joined(&rows, joined_includes(), None).unwrap();
        assert_eq!(graph.len(), 1);

        let charmander = &graph.pokemon()[0];
        let moves = charmander.moves().unwrap();
        assert_eq!(moves.len(), 3);
        let names: Vec<_> = moves.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Tackle", "Ember", "Scratch"]);

        // Same type id means the same instance.
        let ember_type = moves[1].damage_type().unwrap();
        assert!(Rc::ptr_eq(ember_type, charmander.poke_type().unwrap()));
        assert!(Rc::ptr_eq(
            moves[0].damage_type().unwrap(),
            moves[2].damage_type().unwrap()
        ));

        let ash = charmander.trainer().unwrap();
        let owned = ash.pokemon().unwrap();
        assert_eq!(owned.len(), 1);
        assert!(Rc::ptr_eq(&owned[0], charmander));
    }

    #[test]
    fn test_repeated_child_row_does_not_duplicate() {
        let rows = vec![
            joined_row(1, "Tackle", (5, "Normal")),
            joined_row(1, "Tackle", (5, "Normal")),
        ];
        let graph = materialize_joined(&rows, joined_includes(), None).unwrap();
        assert_eq!(graph.pokemon()[0].moves().unwrap().len(), 1);
    }

    /// A wide row for pokemon `(id, name, trainer_id)`, Fire typed, with an
    /// optional Normal damage move. `None` gives an outer join miss.
    fn wide_row(pokemon: (i64, &str, i64), trainer: &str, item: Option<(i64, &str)>) -> Row {
        let (move_group, damage_group) = match item {
            Some((id, name)) => (
                [Value::BigInt(id), text(name), Value::BigInt(pokemon.0), Value::BigInt(5)],
                [Value::BigInt(5), text("Normal")],
            ),
            None => (
                [Value::Null, Value::Null, Value::Null, Value::Null],
                [Value::Null, Value::Null],
            ),
        };
        let mut values = vec![
            Value::BigInt(pokemon.0),
            text(pokemon.1),
            Value::BigInt(pokemon.2),
            Value::BigInt(1),
            Value::BigInt(pokemon.2),
            text(trainer),
            Value::BigInt(1),
            text("Fire"),
        ];
        values.extend(move_group);
        values.extend(damage_group);
        Row::new(cols(JOINED), values)
    }

    #[test]
    fn test_joined_row_order_does_not_matter() {
        let rows = vec![
            wide_row((1, "Charmander", 1), "Ash", Some((10, "Ember"))),
            wide_row((1, "Charmander", 1), "Ash", Some((11, "Scratch"))),
            wide_row((2, "Vulpix", 2), "Brock", Some((12, "Ember"))),
            wide_row((2, "Vulpix", 2), "Brock", Some((13, "Tackle"))),
            wide_row((3, "Ponyta", 1), "Ash", None),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let forward = materialize_joined(&rows, joined_includes(), None).unwrap();
        let backward = materialize_joined(&reversed, joined_includes(), None).unwrap();
        assert_eq!(
            crate::report::GraphSnapshot::capture(&forward).unwrap(),
            crate::report::GraphSnapshot::capture(&backward).unwrap()
        );

        for graph in [&forward, &backward] {
            assert_eq!(graph.len(), 3);
            assert_eq!(graph.find("Charmander").unwrap().moves().unwrap().len(), 2);
            assert_eq!(graph.find("Vulpix").unwrap().moves().unwrap().len(), 2);
            assert!(graph.find("Ponyta").unwrap().moves().unwrap().is_empty());

            let ash = graph.find("Ponyta").unwrap().trainer().unwrap();
            assert_eq!(ash.pokemon().unwrap().len(), 2);
            assert!(Rc::ptr_eq(
                ash,
                graph.find("Charmander").unwrap().trainer().unwrap()
            ));
        }
    }

    #[test]
    fn test_repeated_root_row_refreshes_scalars() {
        let rows = vec![
            wide_row((1, "Charmander", 1), "Ash", Some((10, "Ember"))),
            wide_row((1, "Charmeleon", 1), "Ash", Some((11, "Scratch"))),
        ];
        let graph = materialize_joined(&rows, joined_includes(), None).unwrap();
        assert_eq!(graph.len(), 1);
        let evolved = &graph.pokemon()[0];
        assert_eq!(evolved.name, "Charmeleon");
        assert_eq!(evolved.moves().unwrap().len(), 2);
        assert!(graph.find("Charmander").is_none());
    }

    #[test]
    fn test_missing_group_columns_is_error() {
        let row = Row::new(
            cols(&["p_id", "p_name", "p_trainer_id", "p_poke_type_id"]),
            vec![
                Value::BigInt(1),
                text("Pikachu"),
                Value::BigInt(1),
                Value::BigInt(4),
            ],
        );
        let err = materialize_joined(&[row], Includes::none().trainer(), None).unwrap_err();
        match err {
            Error::Type(e) => assert_eq!(e.column.as_deref(), Some("t_id")),
            other => panic!("expected type error, got {other:?}"),
        }
    }

    fn pokemon_set() -> Vec<Row> {
        vec![Row::new(
            cols(&["p_id", "p_name", "p_trainer_id", "p_poke_type_id", "t_id", "t_name"]),
            vec![
                Value::BigInt(25),
                text("Pikachu"),
                Value::BigInt(1),
                Value::BigInt(4),
                Value::BigInt(1),
                text("Ash"),
            ],
        )]
    }

    fn type_set() -> Vec<Row> {
        [(4, "Electric"), (5, "Normal")]
            .iter()
            .map(|(id, name)| {
                Row::new(cols(&["pt_id", "pt_name"]), vec![Value::BigInt(*id), text(name)])
            })
            .collect()
    }

    fn move_set(damage_type_id: i64) -> Vec<Row> {
        vec![Row::new(
            cols(&["m_id", "m_name", "m_pokemon_id", "m_damage_type_id"]),
            vec![
                Value::BigInt(9),
                text("Tackle"),
                Value::BigInt(25),
                Value::BigInt(damage_type_id),
            ],
        )]
    }

    fn win_set() -> Vec<Row> {
        (1..=3)
            .map(|id| {
                Row::new(
                    cols(&["w_id", "w_pokemon_id", "w_date_time", "w_win"]),
                    vec![
                        Value::BigInt(id),
                        Value::BigInt(25),
                        Value::BigInt(0),
                        Value::BigInt(i64::from(id != 2)),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn test_multi_set_order_does_not_matter() {
        let (p, t, m, w) = (pokemon_set(), type_set(), move_set(5), win_set());
        let forward = [
            RowSet::Pokemon(&p),
            RowSet::PokeTypes(&t),
            RowSet::Moves(&m),
            RowSet::WinRecords(&w),
        ];
        let backward = [
            RowSet::WinRecords(&w),
            RowSet::Moves(&m),
            RowSet::PokeTypes(&t),
            RowSet::Pokemon(&p),
        ];
        for sets in [&forward[..], &backward[..]] {
            let graph = materialize_sets(sets, Includes::all(), None).unwrap();
            let pikachu = graph.find("Pikachu").unwrap();
            assert_eq!(pikachu.trainer().unwrap().name, "Ash");
            assert_eq!(pikachu.poke_type().unwrap().name, "Electric");
            assert_eq!(pikachu.moves().unwrap()[0].damage_type().unwrap().name, "Normal");
            assert_eq!(pikachu.win_string().unwrap(), "2/3");
        }
    }

    #[test]
    fn test_dangling_damage_type() {
        let (p, t, m) = (pokemon_set(), type_set(), move_set(99));
        let err = materialize_sets(
            &[RowSet::Pokemon(&p), RowSet::PokeTypes(&t), RowSet::Moves(&m)],
            Includes::all(),
            None,
        )
        .unwrap_err();
        match err {
            Error::DanglingReference(e) => {
                assert_eq!(e.entity, "Move");
                assert_eq!(e.id, 9);
                assert_eq!(e.field, "damage_type_id");
                assert_eq!(e.target_id, 99);
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn test_included_collections_start_empty() {
        let (p, t) = (pokemon_set(), type_set());
        let graph = materialize_sets(
            &[RowSet::Pokemon(&p), RowSet::PokeTypes(&t)],
            Includes::all(),
            None,
        )
        .unwrap();
        let pikachu = &graph.pokemon()[0];
        assert!(pikachu.moves().unwrap().is_empty());
        assert_eq!(pikachu.win_string().unwrap(), "0/0");
    }

    #[test]
    fn test_excluded_relations_stay_unloaded() {
        let p = pokemon_set();
        let graph = materialize_sets(&[RowSet::Pokemon(&p)], Includes::none(), None).unwrap();
        let pikachu = &graph.pokemon()[0];
        assert_eq!(
            pikachu.loaded_relations(),
            crate::model::LoadedRelations::default()
        );
        assert!(matches!(pikachu.trainer(), Err(Error::NotLoaded(_))));
    }
}
