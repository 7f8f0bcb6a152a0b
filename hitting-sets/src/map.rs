//! # Mapping Between Instance Variables and Backend Columns

use rustsat::types::Var;

/// Trait for backend variable handles that expose a dense index
pub trait AsIndex: Clone {
    fn as_index(&self) -> usize;
}

impl AsIndex for usize {
    fn as_index(&self) -> usize {
        *self
    }
}

/// A bidirectional map between [`Var`]s and dense backend variable handles
///
/// Backend handles must be created in increasing index order, so that the handle index doubles
/// as the position in the reverse map.
#[derive(Debug)]
pub struct VarMap<T> {
    to_backend: Vec<Option<T>>,
    to_var: Vec<Var>,
}

impl<T> VarMap<T> {
    pub fn new(n_vars: usize, n_backend: usize) -> Self {
        VarMap {
            to_backend: Vec::with_capacity(n_vars),
            to_var: Vec::with_capacity(n_backend),
        }
    }

    /// The number of mapped variable pairs
    pub fn len(&self) -> usize {
        self.to_var.len()
    }
}

impl<T: AsIndex> VarMap<T> {
    /// Looks up the backend handle of a variable, creating one with `new_handle` if the variable
    /// is not mapped yet
    ///
    /// # Panics
    ///
    /// If `new_handle` returns a handle that does not carry the next free index.
    pub fn get_or_insert(&mut self, var: Var, new_handle: impl FnOnce() -> T) -> T {
        if let Some(Some(handle)) = self.to_backend.get(var.idx()) {
            return handle.clone();
        }
        let handle = new_handle();
        assert_eq!(handle.as_index(), self.to_var.len());
        self.to_var.push(var);
        if self.to_backend.len() <= var.idx() {
            self.to_backend.resize(var.idx() + 1, None);
        }
        self.to_backend[var.idx()] = Some(handle.clone());
        handle
    }

    /// Iterates over all mapped pairs in backend index order
    pub fn iter(&self) -> impl Iterator<Item = (Var, &T)> + '_ {
        self.to_var
            .iter()
            .map(|&var| (var, self.to_backend[var.idx()].as_ref().unwrap()))
    }
}

impl<T> std::ops::Index<Var> for VarMap<T> {
    type Output = T;

    fn index(&self, var: Var) -> &T {
        self.to_backend[var.idx()]
            .as_ref()
            .expect("variable not mapped")
    }
}

impl<T> std::ops::Index<usize> for VarMap<T> {
    type Output = Var;

    fn index(&self, index: usize) -> &Var {
        &self.to_var[index]
    }
}

#[cfg(test)]
mod tests {
    use rustsat::var;

    use super::*;

    #[test]
    fn maps_both_ways() {
        let mut map: VarMap<usize> = VarMap::new(8, 2);
        assert_eq!(map.get_or_insert(var![5], || 0), 0);
        assert_eq!(map.get_or_insert(var![2], || 1), 1);
        // existing entries are not remapped
        assert_eq!(map.get_or_insert(var![5], || 7), 0);
        assert_eq!(map.len(), 2);
        assert_eq!(map[var![2]], 1);
        assert_eq!(map[0], var![5]);
        assert_eq!(
            map.iter().map(|(var, _)| var).collect::<Vec<_>>(),
            [var![5], var![2]]
        );
    }
}
