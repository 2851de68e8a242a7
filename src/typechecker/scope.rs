use std::collections::HashMap;

/// A LIFO stack of name tables with first-match lookup.
///
/// The same structure backs both phases: the resolver keeps `name -> Type`
/// and the emitter keeps `name -> IR binding`. `define` inserts only into
/// the innermost scope and refuses duplicates there; lookup walks from the
/// innermost scope outwards. Level 0 is the global scope.
#[derive(Debug, Clone)]
pub struct ScopedMap<V> {
    scopes: Vec<HashMap<String, V>>,
}

impl<V> Default for ScopedMap<V> {
    fn default() -> Self {
        ScopedMap {
            scopes: vec![HashMap::new()],
        }
    }
}

impl<V> ScopedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "popped the global scope");
        self.scopes.pop();
    }

    /// Index of the innermost scope.
    pub fn level(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Defines `name` in the innermost scope. Returns `false` if the name
    /// already exists there (outer shadowed definitions are fine).
    pub fn define(&mut self, name: impl ToString, value: V) -> bool {
        let name = name.to_string();
        let top = self.scopes.last_mut().expect("scope stack is never empty");
        if top.contains_key(&name) {
            return false;
        }
        top.insert(name, value);
        true
    }

    /// Defines `name` in the global scope, regardless of the current depth.
    pub fn define_global(&mut self, name: impl ToString, value: V) -> bool {
        let name = name.to_string();
        let global = &mut self.scopes[0];
        if global.contains_key(&name) {
            return false;
        }
        global.insert(name, value);
        true
    }

    /// Inserts or overwrites `name` in the global scope. Interning of
    /// monomorphized types goes through this (stub first, filled later).
    pub fn replace_global(&mut self, name: impl ToString, value: V) {
        self.scopes[0].insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&V> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Like [`ScopedMap::lookup`], additionally yielding the level the name
    /// was found at. Lambda capture inference uses the level to distinguish
    /// globals (level 0) from enclosing locals.
    pub fn lookup_with_level(&self, name: &str) -> Option<(&V, usize)> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(level, scope)| scope.get(name).map(|value| (value, level)))
    }

    /// Lookup restricted to the innermost scope.
    pub fn lookup_local(&self, name: &str) -> Option<&V> {
        self.scopes.last().and_then(|scope| scope.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_rejects_duplicates_in_same_scope() {
        let mut map = ScopedMap::new();
        assert!(map.define("x", 1));
        assert!(!map.define("x", 2));
        assert_eq!(map.lookup("x"), Some(&1));
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        let mut map = ScopedMap::new();
        map.define("x", 1);
        map.push_scope();
        assert!(map.define("x", 2));
        assert_eq!(map.lookup("x"), Some(&2));
        map.pop_scope();
        assert_eq!(map.lookup("x"), Some(&1));
    }

    #[test]
    fn test_names_do_not_escape_their_scope() {
        let mut map = ScopedMap::new();
        map.push_scope();
        map.define("inner", 1);
        map.pop_scope();
        assert_eq!(map.lookup("inner"), None);
    }

    #[test]
    fn test_lookup_with_level() {
        let mut map = ScopedMap::new();
        map.define("global", 0);
        map.push_scope();
        map.define("outer", 1);
        map.push_scope();
        map.define("local", 2);

        assert_eq!(map.lookup_with_level("global"), Some((&0, 0)));
        assert_eq!(map.lookup_with_level("outer"), Some((&1, 1)));
        assert_eq!(map.lookup_with_level("local"), Some((&2, 2)));
        assert_eq!(map.level(), 2);
    }
}
