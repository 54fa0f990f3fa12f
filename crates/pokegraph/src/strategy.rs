//! Retrieval strategies.
//!
//! Each strategy loads the full pokemon graph with a different trade-off
//! between round trips and bytes on the wire. All of them yield graphs
//! that compare equal under [`GraphSnapshot`](crate::report::GraphSnapshot).
//!
//! | Strategy | Round trips on the seed data |
//! |----------|------------------------------|
//! | OnDemand | 20 |
//! | EagerPartial | 8 |
//! | EagerFull | 1 |
//! | ManualBatched | 3 |
//! | RawMultiResult | 2 |

use crate::loader::OnDemandLoader;
use crate::materialize::{Includes, RowSet, materialize_joined, materialize_sets};
use crate::model::{MoveRecord, PokeType, PokemonGraph, PokemonRecord, TrainerRecord, WinRecord};
use pokegraph_core::{Result, RowSource, Statement, in_list, select_list};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Per-call loading options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Attach an on-demand loader to relations the strategy leaves unloaded.
    ///
    /// When off, reading such a relation fails with `Error::NotLoaded`.
    pub on_demand: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { on_demand: true }
    }
}

impl LoadOptions {
    pub const fn eager_only() -> Self {
        Self { on_demand: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Root list first, every relation fetched on first access.
    OnDemand,
    /// Pokemon joined with moves and win records; the rest on demand.
    EagerPartial,
    /// One wide join of everything.
    EagerFull,
    /// Three queries stitched together by id.
    ManualBatched,
    /// One root query plus one batched round trip.
    RawMultiResult,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::OnDemand,
        Strategy::EagerPartial,
        Strategy::EagerFull,
        Strategy::ManualBatched,
        Strategy::RawMultiResult,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Strategy::OnDemand => "on-demand",
            Strategy::EagerPartial => "eager-partial",
            Strategy::EagerFull => "eager-full",
            Strategy::ManualBatched => "manual-batched",
            Strategy::RawMultiResult => "raw-multi-result",
        }
    }

    /// Whether this strategy ever consults the on-demand loader.
    pub const fn uses_on_demand(self) -> bool {
        matches!(self, Strategy::OnDemand | Strategy::EagerPartial)
    }

    /// Load the full graph from `source`.
    ///
    /// A fresh graph is built on every call; nothing is cached across calls.
    pub fn load(self, source: &Rc<dyn RowSource>, options: LoadOptions) -> Result<PokemonGraph> {
        let loader = if options.on_demand && self.uses_on_demand() {
            Some(OnDemandLoader::new(Rc::clone(source)))
        } else {
            None
        };
        tracing::debug!(
            target: "pokegraph::strategy",
            strategy = self.name(),
            on_demand = loader.is_some(),
            "loading graph"
        );

        match self {
            Strategy::OnDemand => load_on_demand(source.as_ref(), loader),
            Strategy::EagerPartial => load_eager_partial(source.as_ref(), loader),
            Strategy::EagerFull => load_eager_full(source.as_ref()),
            Strategy::ManualBatched => load_manual_batched(source.as_ref()),
            Strategy::RawMultiResult => load_raw_multi_result(source.as_ref()),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Strategy::ALL.iter().map(|s| s.name()).collect();
                format!("unknown strategy '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

// ============================================================================
// SQL
// ============================================================================

fn pokemon_columns() -> String {
    select_list::<PokemonRecord>("p", "p_")
}

fn pokemon_ids(graph_rows: &[pokegraph_core::Row]) -> Result<Vec<i64>> {
    let mut ids: Vec<i64> = graph_rows
        .iter()
        .map(|row| row.get_named::<i64>("p_id"))
        .collect::<Result<_>>()?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn load_on_demand(
    source: &dyn RowSource,
    loader: Option<Rc<OnDemandLoader>>,
) -> Result<PokemonGraph> {
    let sql = format!("SELECT {} FROM pokemon p ORDER BY p.id", pokemon_columns());
    let rows = source.query(&sql, &[])?;
    materialize_sets(&[RowSet::Pokemon(&rows)], Includes::none(), loader)
}

fn load_eager_partial(
    source: &dyn RowSource,
    loader: Option<Rc<OnDemandLoader>>,
) -> Result<PokemonGraph> {
    let sql = format!(
        "SELECT {}, {}, {} FROM pokemon p \
         LEFT JOIN moves m ON m.pokemon_id = p.id \
         LEFT JOIN win_records w ON w.pokemon_id = p.id \
         ORDER BY p.id, m.id, w.id",
        pokemon_columns(),
        select_list::<MoveRecord>("m", "m_"),
        select_list::<WinRecord>("w", "w_"),
    );
    let rows = source.query(&sql, &[])?;
    materialize_joined(&rows, Includes::none().moves().win_records(), loader)
}

fn load_eager_full(source: &dyn RowSource) -> Result<PokemonGraph> {
    let sql = format!(
        "SELECT {}, {}, {}, {}, {}, {} FROM pokemon p \
         LEFT JOIN trainers t ON t.id = p.trainer_id \
         LEFT JOIN poke_types pt ON pt.id = p.poke_type_id \
         LEFT JOIN moves m ON m.pokemon_id = p.id \
         LEFT JOIN poke_types dt ON dt.id = m.damage_type_id \
         LEFT JOIN win_records w ON w.pokemon_id = p.id \
         ORDER BY p.id, m.id, w.id",
        pokemon_columns(),
        select_list::<TrainerRecord>("t", "t_"),
        select_list::<PokeType>("pt", "pt_"),
        select_list::<MoveRecord>("m", "m_"),
        select_list::<PokeType>("dt", "dt_"),
        select_list::<WinRecord>("w", "w_"),
    );
    let rows = source.query(&sql, &[])?;
    materialize_joined(&rows, Includes::all(), None)
}

fn load_manual_batched(source: &dyn RowSource) -> Result<PokemonGraph> {
    let root_sql = format!(
        "SELECT {}, {}, {} FROM pokemon p \
         LEFT JOIN trainers t ON t.id = p.trainer_id \
         LEFT JOIN poke_types pt ON pt.id = p.poke_type_id \
         ORDER BY p.id",
        pokemon_columns(),
        select_list::<TrainerRecord>("t", "t_"),
        select_list::<PokeType>("pt", "pt_"),
    );
    let pokemon = source.query(&root_sql, &[])?;
    let ids = pokemon_ids(&pokemon)?;

    let (filter, params) = in_list("m.pokemon_id", &ids);
    let moves_sql = format!(
        "SELECT {}, {} FROM moves m \
         LEFT JOIN poke_types dt ON dt.id = m.damage_type_id \
         WHERE {filter} ORDER BY m.id",
        select_list::<MoveRecord>("m", "m_"),
        select_list::<PokeType>("dt", "dt_"),
    );
    let moves = source.query(&moves_sql, &params)?;

    let (filter, params) = in_list("w.pokemon_id", &ids);
    let wins_sql = format!(
        "SELECT {} FROM win_records w WHERE {filter} ORDER BY w.id",
        select_list::<WinRecord>("w", "w_"),
    );
    let wins = source.query(&wins_sql, &params)?;

    materialize_sets(
        &[
            RowSet::Pokemon(&pokemon),
            RowSet::Moves(&moves),
            RowSet::WinRecords(&wins),
        ],
        Includes::all(),
        None,
    )
}

fn load_raw_multi_result(source: &dyn RowSource) -> Result<PokemonGraph> {
    let root_sql = format!(
        "SELECT {}, {} FROM pokemon p \
         LEFT JOIN trainers t ON t.id = p.trainer_id \
         ORDER BY p.id",
        pokemon_columns(),
        select_list::<TrainerRecord>("t", "t_"),
    );
    let pokemon = source.query(&root_sql, &[])?;
    let ids = pokemon_ids(&pokemon)?;

    let (move_filter, move_params) = in_list("m.pokemon_id", &ids);
    let (win_filter, win_params) = in_list("w.pokemon_id", &ids);
    let batch = [
        Statement::bare(format!(
            "SELECT {} FROM poke_types pt ORDER BY pt.id",
            select_list::<PokeType>("pt", "pt_")
        )),
        Statement::new(
            format!(
                "SELECT {} FROM moves m WHERE {move_filter} ORDER BY m.id",
                select_list::<MoveRecord>("m", "m_")
            ),
            move_params,
        ),
        Statement::new(
            format!(
                "SELECT {} FROM win_records w WHERE {win_filter} ORDER BY w.id",
                select_list::<WinRecord>("w", "w_")
            ),
            win_params,
        ),
    ];
    let sets = source.query_batch(&batch)?;
    let [types, moves, wins] = sets.as_slice() else {
        return Err(pokegraph_core::Error::Custom(format!(
            "batched fetch returned {} row sets, expected 3",
            sets.len()
        )));
    };

    materialize_sets(
        &[
            RowSet::Pokemon(&pokemon),
            RowSet::PokeTypes(types),
            RowSet::Moves(moves),
            RowSet::WinRecords(wins),
        ],
        Includes::all(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
        }
        assert_eq!(
            "Eager_Full".parse::<Strategy>().unwrap(),
            Strategy::EagerFull
        );
        let err = "lazy".parse::<Strategy>().unwrap_err();
        assert!(err.contains("on-demand"));
    }

    #[test]
    fn test_only_lazy_strategies_use_loader() {
        let lazy: Vec<_> = Strategy::ALL
            .into_iter()
            .filter(|s| s.uses_on_demand())
            .collect();
        assert_eq!(lazy, [Strategy::OnDemand, Strategy::EagerPartial]);
    }

    #[test]
    fn test_default_options_allow_on_demand() {
        assert!(LoadOptions::default().on_demand);
        assert!(!LoadOptions::eager_only().on_demand);
    }
}
