//! The scope tree (phase B).
//!
//! A scope maps source names to `AstSymbol`s and points at its parent.
//! Terms and types live in separate namespaces, each with its own root:
//! the term root holds every value declaration of the base and user
//! modules, the type root holds type constructors, classes, and instance
//! symbols.

use rustc_hash::FxHashMap;

use crate::base::{Arena, Idx, Symbol};
use crate::syntax::symbol::SymbolId;

pub type ScopeId = Idx<Scope>;

/// One scope: name -> symbol, plus the parent link.
#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub symbols: FxHashMap<Symbol, SymbolId>,
}

impl Scope {
    fn new(parent: Option<ScopeId>) -> Self {
        Scope {
            parent,
            symbols: FxHashMap::default(),
        }
    }
}

/// The scope tree for one compilation.
#[derive(Debug)]
pub struct ScopeTable {
    scopes: Arena<Scope>,
    /// Root scope for term-level names.
    pub top_term: ScopeId,
    /// Root scope for type-level names (type constructors, classes,
    /// instances).
    pub top_type: ScopeId,
}

impl ScopeTable {
    pub fn new() -> Self {
        let mut scopes = Arena::new();
        let top_term = scopes.alloc(Scope::new(None));
        let top_type = scopes.alloc(Scope::new(None));
        ScopeTable {
            scopes,
            top_term,
            top_type,
        }
    }

    pub fn enter_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.alloc(Scope::new(Some(parent)))
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        self.scopes.get(id)
    }

    /// Insert `name` into `scope`. Returns the shadowed symbol when the
    /// name was already bound in this exact scope (callers turn that into
    /// a duplicate-declaration error at declaration level).
    pub fn insert(&mut self, scope: ScopeId, name: Symbol, symbol: SymbolId) -> Option<SymbolId> {
        self.scopes.get_mut(scope).symbols.insert(name, symbol)
    }

    /// Look `name` up in `scope` only, no chain walking.
    pub fn find_in_scope(&self, scope: ScopeId, name: &Symbol) -> Option<SymbolId> {
        self.scopes.get(scope).symbols.get(name).copied()
    }

    /// Look `name` up through the scope chain, innermost first.
    pub fn find(&self, scope: ScopeId, name: &Symbol) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(&symbol) = self.scopes.get(id).symbols.get(name) {
                return Some(symbol);
            }
            current = self.scopes.get(id).parent;
        }
        None
    }

    /// True when `inner` is `outer` or nested somewhere below it.
    pub fn is_within(&self, inner: ScopeId, outer: ScopeId) -> bool {
        let mut current = Some(inner);
        while let Some(id) = current {
            if id == outer {
                return true;
            }
            current = self.scopes.get(id).parent;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Interner, SourceSpan};
    use crate::syntax::symbol::SymbolTable;

    #[test]
    fn test_find_walks_chain() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut scopes = ScopeTable::new();
        let module = interner.intern("Main");
        let name = interner.intern("freq");
        let sym = symbols.fresh(name.clone(), module, SourceSpan::NULL);

        scopes.insert(scopes.top_term, name.clone(), sym);
        let inner = scopes.enter_scope(scopes.top_term);
        let deeper = scopes.enter_scope(inner);

        assert_eq!(scopes.find(deeper, &name), Some(sym));
        assert_eq!(scopes.find_in_scope(deeper, &name), None);
    }

    #[test]
    fn test_shadowing() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut scopes = ScopeTable::new();
        let module = interner.intern("Main");
        let name = interner.intern("x");
        let outer_sym = symbols.fresh(name.clone(), module.clone(), SourceSpan::NULL);
        let inner_sym = symbols.fresh(name.clone(), module, SourceSpan::NULL);

        scopes.insert(scopes.top_term, name.clone(), outer_sym);
        let inner = scopes.enter_scope(scopes.top_term);
        scopes.insert(inner, name.clone(), inner_sym);

        assert_eq!(scopes.find(inner, &name), Some(inner_sym));
        assert_eq!(scopes.find(scopes.top_term, &name), Some(outer_sym));
    }
}
