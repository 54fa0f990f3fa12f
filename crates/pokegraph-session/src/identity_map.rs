//! Identity Map for unique instances per primary key.
//!
//! Within one materialization each `(type, id)` pair maps to exactly one
//! stored value. The map owns that value; callers receive `&mut T` to it,
//! so later rows for the same key refresh or extend the one instance
//! instead of creating a second.
//!
//! # Design
//!
//! Each stored type gets its own typed table (`Slots<T>`), found through a
//! `TypeId`-keyed map of type-erased boxes. A table keeps its values in a
//! `Vec` in first-seen order with an id index beside it. Iteration is
//! therefore in arrival order, which fixes collection order for the
//! linking pass.
//!
//! # Example
//!
//! ```ignore
//! let mut map = IdentityMap::new();
//! let first = map.get_or_create::<TrainerRecord>(1, || record.clone());
//! let again = map.get_or_create::<TrainerRecord>(1, || unreachable!());
//! ```

use pokegraph_core::{DuplicateRootError, Entity};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Values of one type, in arrival order, indexed by id.
struct Slots<T> {
    index: HashMap<i64, usize>,
    items: Vec<T>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            items: Vec::new(),
        }
    }
}

/// Identity Map keyed by `(TypeId, id)`.
///
/// Not thread-safe; one map belongs to one load.
#[derive(Default)]
pub struct IdentityMap {
    tables: HashMap<TypeId, Box<dyn Any>>,
    total: usize,
}

impl IdentityMap {
    /// Create a new empty identity map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            total: 0,
        }
    }

    fn slots<T: 'static>(&self) -> Option<&Slots<T>> {
        self.tables.get(&TypeId::of::<T>())?.downcast_ref()
    }

    fn slots_mut<T: 'static>(&mut self) -> &mut Slots<T> {
        let table = self
            .tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Slots::<T>::new()));
        match table.downcast_mut::<Slots<T>>() {
            Some(slots) => slots,
            None => unreachable!("identity map tables are keyed by their own TypeId"),
        }
    }

    /// Return the instance registered for `(T, id)`, creating it with
    /// `factory` on first sight.
    ///
    /// `factory` runs at most once per key for the lifetime of the map.
    pub fn get_or_create<T: 'static>(&mut self, id: i64, factory: impl FnOnce() -> T) -> &mut T {
        let mut created = false;
        let slots = self.slots_mut::<T>();
        let position = match slots.index.get(&id).copied() {
            Some(position) => position,
            None => {
                let position = slots.items.len();
                slots.items.push(factory());
                slots.index.insert(id, position);
                created = true;
                position
            }
        };
        if created {
            self.total += 1;
        }
        let slots = self.slots_mut::<T>();
        &mut slots.items[position]
    }

    /// Register a value that must not already be present.
    pub fn insert_new<T: Entity>(
        &mut self,
        id: i64,
        value: T,
    ) -> Result<&mut T, DuplicateRootError> {
        self.insert_unique(T::NAME, id, value)
    }

    /// Like [`insert_new`](Self::insert_new) for values that are not
    /// records themselves, such as shared graph handles.
    pub fn insert_unique<T: 'static>(
        &mut self,
        entity: &'static str,
        id: i64,
        value: T,
    ) -> Result<&mut T, DuplicateRootError> {
        if self.contains::<T>(id) {
            return Err(DuplicateRootError { entity, id });
        }
        Ok(self.get_or_create(id, || value))
    }

    pub fn get<T: 'static>(&self, id: i64) -> Option<&T> {
        let slots = self.slots::<T>()?;
        slots.index.get(&id).map(|&position| &slots.items[position])
    }

    pub fn get_mut<T: 'static>(&mut self, id: i64) -> Option<&mut T> {
        let slots = self.slots_mut::<T>();
        let position = slots.index.get(&id).copied()?;
        Some(&mut slots.items[position])
    }

    pub fn contains<T: 'static>(&self, id: i64) -> bool {
        self.slots::<T>()
            .is_some_and(|slots| slots.index.contains_key(&id))
    }

    /// All values of type `T`, in the order their ids were first seen.
    pub fn values<T: 'static>(&self) -> impl Iterator<Item = &T> {
        self.slots::<T>()
            .map(|slots| slots.items.as_slice())
            .unwrap_or_default()
            .iter()
    }

    /// Number of values of type `T`.
    pub fn len_of<T: 'static>(&self) -> usize {
        self.slots::<T>().map_or(0, |slots| slots.items.len())
    }

    /// Total number of values across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Clear all entries from the identity map.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.total = 0;
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("types", &self.tables.len())
            .field("total", &self.total)
            .finish()
    }
}
