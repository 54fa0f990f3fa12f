//! Rendering and comparing loaded graphs.

use crate::model::{Pokemon, PokemonGraph};
use pokegraph_console::Console;
use pokegraph_core::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// The stats block printed for one pokemon.
///
/// Touches every relation, so under an on-demand strategy this is what
/// drives the lazy loads.
pub fn pokemon_stats(pokemon: &Pokemon) -> Result<String> {
    let trainer = pokemon.trainer()?;
    let poke_type = pokemon.poke_type()?;
    let mut out = format!(
        "{} owns {} a {} type pokemon has the following moves:\n",
        trainer.name, pokemon.name, poke_type.name
    );
    for item in pokemon.moves()? {
        let _ = writeln!(out, "  - {} ({})", item.name, item.damage_type()?.name);
    }
    let _ = write!(out, "and a win record of {}", pokemon.win_string()?);
    Ok(out)
}

/// Print [`pokemon_stats`] through the console. Quiet mode hides the text
/// but the relations are still loaded.
pub fn print_pokemon_stats(console: &Console, pokemon: &Pokemon) -> Result<()> {
    let stats = pokemon_stats(pokemon)?;
    console.print(&stats);
    Ok(())
}

/// Structural summary of one pokemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PokemonSnapshot {
    pub id: i64,
    pub name: String,
    pub trainer_id: i64,
    pub poke_type: String,
    /// `(move, damage type)`, sorted.
    pub moves: Vec<(String, String)>,
    pub wins: usize,
    pub battles: usize,
}

/// Order-independent view of a graph: trainer name → pokemon summaries,
/// sorted by name then id.
///
/// Two graphs are structurally equal when their snapshots are equal.
/// Instance identity and collection order are ignored. Ids are kept, so
/// same-named pokemon stay distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub trainers: BTreeMap<String, Vec<PokemonSnapshot>>,
}

impl GraphSnapshot {
    pub fn capture(graph: &PokemonGraph) -> Result<Self> {
        let mut trainers: BTreeMap<String, Vec<PokemonSnapshot>> = BTreeMap::new();
        for pokemon in graph {
            let mut moves = pokemon
                .moves()?
                .iter()
                .map(|m| -> Result<(String, String)> {
                    Ok((m.name.clone(), m.damage_type()?.name.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            moves.sort();
            let records = pokemon.win_records()?;
            let trainer = pokemon.trainer()?;
            let snapshot = PokemonSnapshot {
                id: pokemon.id,
                name: pokemon.name.clone(),
                trainer_id: trainer.id,
                poke_type: pokemon.poke_type()?.name.clone(),
                moves,
                wins: records.iter().filter(|r| r.win).count(),
                battles: records.len(),
            };
            trainers
                .entry(trainer.name.clone())
                .or_default()
                .push(snapshot);
        }
        for list in trainers.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        }
        Ok(Self { trainers })
    }

    pub fn pokemon_count(&self) -> usize {
        self.trainers.values().map(Vec::len).sum()
    }

    /// First pokemon called `pokemon` owned by `trainer`.
    pub fn get(&self, trainer: &str, pokemon: &str) -> Option<&PokemonSnapshot> {
        self.trainers
            .get(trainer)?
            .iter()
            .find(|p| p.name == pokemon)
    }
}
