//! Memoized relation cells.

use crate::error::Result;
use std::cell::OnceCell;
use std::fmt;

/// A relation that is either filled during materialization or loaded on
/// first access.
///
/// # States
///
/// - **Unloaded**: nothing fetched yet; [`get`](Lazy::get) returns `None`
/// - **Loaded**: value cached; every later access returns the same value
///
/// A failed load leaves the cell unloaded, so the next access retries.
///
/// ```ignore
/// let trainer = pokemon.trainer.get_or_try_load(|| loader.trainer(id))?;
/// ```
pub struct Lazy<T> {
    loaded: OnceCell<T>,
}

impl<T> Lazy<T> {
    /// An unloaded cell.
    pub const fn unloaded() -> Self {
        Self {
            loaded: OnceCell::new(),
        }
    }

    /// A cell that is already loaded with `value`.
    pub fn loaded(value: T) -> Self {
        let loaded = OnceCell::new();
        let _ = loaded.set(value);
        Self { loaded }
    }

    pub fn get(&self) -> Option<&T> {
        self.loaded.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Fill the cell. Returns the value back if the cell was already loaded.
    pub fn set_loaded(&self, value: T) -> std::result::Result<(), T> {
        self.loaded.set(value)
    }

    /// Return the cached value, running `load` exactly once on a miss.
    ///
    /// If `load` fills the cell itself (re-entrantly), the first value wins
    /// and the freshly loaded one is dropped.
    pub fn get_or_try_load<F>(&self, load: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.loaded.get() {
            return Ok(value);
        }
        let value = load()?;
        Ok(self.loaded.get_or_init(|| value))
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loaded.get() {
            Some(value) => f.debug_tuple("Lazy::Loaded").field(value).finish(),
            None => f.write_str("Lazy::Unloaded"),
        }
    }
}
