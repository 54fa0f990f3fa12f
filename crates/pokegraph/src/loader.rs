//! On-demand relation loading.
//!
//! An [`OnDemandLoader`] is attached to the graph entities of one strategy
//! invocation. Each unloaded relation asks it for data on first access,
//! which costs exactly one query. The loader keeps a context-level
//! [`IdentityMap`] so a trainer or type that was already seen during the
//! same invocation is handed out again instead of being fetched twice.
//!
//! The context holds `Weak` handles to trainers and pokemon. Entities hold
//! the loader strongly, so the loader lives exactly as long as the graph.

use crate::model::{Move, MoveRecord, PokeType, Pokemon, Trainer, TrainerRecord, WinRecord};
use pokegraph_core::{Entity, Result, Row, RowSource, Value, select_list};
use pokegraph_session::IdentityMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub struct OnDemandLoader {
    source: Rc<dyn RowSource>,
    context: RefCell<IdentityMap>,
    this: Weak<OnDemandLoader>,
}

impl OnDemandLoader {
    pub fn new(source: Rc<dyn RowSource>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            source,
            context: RefCell::new(IdentityMap::new()),
            this: this.clone(),
        })
    }

    fn handle(&self) -> Option<Rc<Self>> {
        self.this.upgrade()
    }

    fn remember<T: 'static>(&self, id: i64, value: T) {
        let mut context = self.context.borrow_mut();
        if let Some(slot) = context.get_mut::<T>(id) {
            *slot = value;
            return;
        }
        context.get_or_create(id, || value);
    }

    fn fetch_one(&self, sql: &str, id: i64) -> Result<Option<Row>> {
        Ok(self.source.query(sql, &[Value::BigInt(id)])?.into_iter().next())
    }

    pub(crate) fn register_trainer(&self, trainer: &Rc<Trainer>) {
        self.remember(trainer.id, Rc::downgrade(trainer));
    }

    pub(crate) fn register_poke_type(&self, poke_type: &Rc<PokeType>) {
        self.remember(poke_type.id, Rc::clone(poke_type));
    }

    pub(crate) fn register_pokemon(&self, pokemon: &Rc<Pokemon>) {
        self.remember(pokemon.id, Rc::downgrade(pokemon));
    }

    /// Load a trainer by id, reusing one already seen in this invocation.
    pub fn trainer(&self, id: i64) -> Result<Option<Rc<Trainer>>> {
        let seen = self
            .context
            .borrow()
            .get::<Weak<Trainer>>(id)
            .and_then(Weak::upgrade);
        if let Some(trainer) = seen {
            return Ok(Some(trainer));
        }

        tracing::debug!(target: "pokegraph::loader", relation = "trainer", id, "loading");
        let sql = format!(
            "SELECT {} FROM trainers t WHERE t.id = ?",
            select_list::<TrainerRecord>("t", "t_")
        );
        let Some(row) = self.fetch_one(&sql, id)? else {
            return Ok(None);
        };
        let record = TrainerRecord::from_columns(&row.prefixed("t_"))?;
        let trainer = Rc::new(Trainer::new(record, self.handle()));
        self.register_trainer(&trainer);
        Ok(Some(trainer))
    }

    /// Load a type by id. Serves both primary types and damage types.
    pub fn poke_type(&self, id: i64) -> Result<Option<Rc<PokeType>>> {
        if let Some(poke_type) = self.context.borrow().get::<Rc<PokeType>>(id) {
            return Ok(Some(Rc::clone(poke_type)));
        }

        tracing::debug!(target: "pokegraph::loader", relation = "poke_type", id, "loading");
        let sql = format!(
            "SELECT {} FROM poke_types pt WHERE pt.id = ?",
            select_list::<PokeType>("pt", "pt_")
        );
        let Some(row) = self.fetch_one(&sql, id)? else {
            return Ok(None);
        };
        let poke_type = Rc::new(PokeType::from_columns(&row.prefixed("pt_"))?);
        self.register_poke_type(&poke_type);
        Ok(Some(poke_type))
    }

    /// Load the moves of one pokemon, in id order.
    pub fn moves_for(&self, pokemon_id: i64, owner: Weak<Pokemon>) -> Result<Vec<Rc<Move>>> {
        tracing::debug!(target: "pokegraph::loader", relation = "moves", pokemon_id, "loading");
        let sql = format!(
            "SELECT {} FROM moves m WHERE m.pokemon_id = ? ORDER BY m.id",
            select_list::<MoveRecord>("m", "m_")
        );
        self.source
            .query(&sql, &[Value::BigInt(pokemon_id)])?
            .iter()
            .map(|row| {
                let record = MoveRecord::from_columns(&row.prefixed("m_"))?;
                Ok(Rc::new(Move::new(record, owner.clone(), self.handle())))
            })
            .collect()
    }

    /// Load the win records of one pokemon, in id order.
    pub fn win_records_for(&self, pokemon_id: i64) -> Result<Vec<WinRecord>> {
        tracing::debug!(
            target: "pokegraph::loader",
            relation = "win_records",
            pokemon_id,
            "loading"
        );
        let sql = format!(
            "SELECT {} FROM win_records w WHERE w.pokemon_id = ? ORDER BY w.id",
            select_list::<WinRecord>("w", "w_")
        );
        self.source
            .query(&sql, &[Value::BigInt(pokemon_id)])?
            .iter()
            .map(|row| WinRecord::from_columns(&row.prefixed("w_")))
            .collect()
    }

    /// Pokemon of the current graph owned by `trainer_id`, in arrival order.
    ///
    /// Every strategy loads the full pokemon list up front, so this needs no
    /// query.
    pub fn pokemon_of(&self, trainer_id: i64) -> Vec<Weak<Pokemon>> {
        self.context
            .borrow()
            .values::<Weak<Pokemon>>()
            .filter(|weak| weak.upgrade().is_some_and(|p| p.trainer_id == trainer_id))
            .cloned()
            .collect()
    }

    /// Number of entities known to this invocation's context.
    pub fn context_len(&self) -> usize {
        self.context.borrow().len()
    }
}

impl fmt::Debug for OnDemandLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandLoader")
            .field("context_len", &self.context_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokegraph_core::Statement;
    use std::cell::Cell;

    /// Answers every trainer/type lookup with a fixed row and counts queries.
    struct Canned {
        queries: Cell<usize>,
    }

    impl RowSource for Canned {
        fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
            self.queries.set(self.queries.get() + 1);
            let id = params.first().and_then(Value::as_i64).unwrap_or_default();
            let prefix = if sql.contains("FROM trainers") {
                "t_"
            } else {
                "pt_"
            };
            if id == 404 {
                return Ok(Vec::new());
            }
            Ok(vec![Row::new(
                vec![format!("{prefix}id"), format!("{prefix}name")],
                vec![Value::BigInt(id), Value::Text(format!("name-{id}"))],
            )])
        }

        fn query_batch(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>> {
            statements
                .iter()
                .map(|s| self.query(&s.sql, &s.params))
                .collect()
        }

        fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            Ok(0)
        }
    }

    fn loader() -> (Rc<Canned>, Rc<OnDemandLoader>) {
        let source = Rc::new(Canned {
            queries: Cell::new(0),
        });
        let loader = OnDemandLoader::new(source.clone());
        (source, loader)
    }

    #[test]
    fn test_poke_type_is_fetched_once() {
        let (source, loader) = loader();
        let first = loader.poke_type(3).unwrap().unwrap();
        let second = loader.poke_type(3).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(source.queries.get(), 1);
    }

    #[test]
    fn test_trainer_reused_while_alive() {
        let (source, loader) = loader();
        let ash = loader.trainer(1).unwrap().unwrap();
        let again = loader.trainer(1).unwrap().unwrap();
        assert!(Rc::ptr_eq(&ash, &again));
        assert_eq!(source.queries.get(), 1);

        drop(ash);
        drop(again);
        loader.trainer(1).unwrap().unwrap();
        assert_eq!(source.queries.get(), 2);
    }

    #[test]
    fn test_missing_row_is_none() {
        let (_, loader) = loader();
        assert!(loader.trainer(404).unwrap().is_none());
        assert!(loader.poke_type(404).unwrap().is_none());
    }
}
