//! `AstSymbol`: the binding-site record shared across phases.
//!
//! One `AstSymbol` exists per named entity (variable, constructor, type
//! constructor, class, method). It is created during reification and its
//! metadata is filled in as phases advance; every field is written by
//! exactly one phase and only read afterwards. All symbols live in the
//! [`SymbolTable`] arena and mutation goes through [`SymbolTable::get_mut`].

use crate::base::{Arena, Idx, SourceSpan, Symbol};
use crate::syntax::ast::AstId;
use crate::types::alias::AliasSet;
use crate::types::class::{ClassId, InstanceId};
use crate::types::TypeId;

pub type SymbolId = Idx<AstSymbol>;

/// Run-time storage class of a binding, assigned by state analysis.
/// Ordered: merging two classes takes the maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum StateType {
    #[default]
    Constant,
    Pointwise,
    Stateful,
    Poly,
}

impl StateType {
    pub fn merge(self, other: StateType) -> StateType {
        self.max(other)
    }
}

/// The binding-site record for a named entity.
#[derive(Clone, Debug)]
pub struct AstSymbol {
    /// Possibly-mangled unique name (`addPair<Int>`).
    pub name: Symbol,
    /// The name as written in source.
    pub source_name: Symbol,
    /// Declaring module.
    pub module_name: Symbol,
    /// Declaration site span.
    pub span: SourceSpan,

    /// Principal type; required non-null after inference.
    pub ty: Option<TypeId>,
    /// The declaration AST node, when this symbol names a declaration.
    pub ast: Option<AstId>,
    /// The `DeclarationGroup` node this declaration belongs to.
    pub declaration_group: Option<AstId>,
    /// `name :: ...` signature attached to this binding, if any.
    pub optional_type_signature: Option<AstId>,

    /// When this symbol is a class-method name: the owning class.
    pub method_type_class: Option<ClassId>,
    /// When this symbol names a class: its record.
    pub type_class: Option<ClassId>,
    /// When this symbol names an instance declaration: its record.
    pub type_class_instance: Option<InstanceId>,
    /// Instances declared for this type constructor.
    pub instance_list: Vec<InstanceId>,

    pub state_type: StateType,
    /// Count of leading lambdas, filled during Core translation.
    pub arity: Option<usize>,
    /// Position of this constructor within its data declaration.
    pub con_num: usize,

    pub is_constructor: bool,
    /// All constructors of the data type are nullary (copy type).
    pub is_enum: bool,
    /// Single constructor carrying a single field.
    pub is_wrapper: bool,
    pub is_recursive: bool,
    pub is_primitive: bool,

    /// Symbols that may name the same storage; see alias analysis.
    pub alias_set: Option<AliasSet>,
}

impl AstSymbol {
    pub fn new(name: Symbol, source_name: Symbol, module_name: Symbol, span: SourceSpan) -> Self {
        AstSymbol {
            name,
            source_name,
            module_name,
            span,
            ty: None,
            ast: None,
            declaration_group: None,
            optional_type_signature: None,
            method_type_class: None,
            type_class: None,
            type_class_instance: None,
            instance_list: Vec::new(),
            state_type: StateType::Constant,
            arity: None,
            con_num: 0,
            is_constructor: false,
            is_enum: false,
            is_wrapper: false,
            is_recursive: false,
            is_primitive: false,
            alias_set: None,
        }
    }
}

/// Arena storage for all symbols of a compilation - single source of truth.
#[derive(Debug, Default)]
pub struct SymbolTable {
    arena: Arena<AstSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: AstSymbol) -> SymbolId {
        self.arena.alloc(symbol)
    }

    /// Create a symbol whose unique and source names coincide.
    pub fn fresh(&mut self, name: Symbol, module_name: Symbol, span: SourceSpan) -> SymbolId {
        self.insert(AstSymbol::new(name.clone(), name, module_name, span))
    }

    pub fn get(&self, id: SymbolId) -> &AstSymbol {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut AstSymbol {
        self.arena.get_mut(id)
    }

    pub fn name(&self, id: SymbolId) -> &Symbol {
        &self.arena.get(id).name
    }

    pub fn source_name(&self, id: SymbolId) -> &Symbol {
        &self.arena.get(id).source_name
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &AstSymbol)> {
        self.arena.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Interner;

    #[test]
    fn test_state_type_merge_is_max() {
        use StateType::*;
        assert_eq!(Constant.merge(Pointwise), Pointwise);
        assert_eq!(Pointwise.merge(Stateful), Stateful);
        assert_eq!(Stateful.merge(Poly), Poly);
        assert_eq!(Poly.merge(Constant), Poly);
        // idempotent
        assert_eq!(Stateful.merge(Stateful), Stateful);
    }

    #[test]
    fn test_symbol_table_mutation() {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new();
        let name = interner.intern("x");
        let module = interner.intern("Main");
        let id = table.fresh(name, module, SourceSpan::NULL);
        assert!(!table.get(id).is_recursive);
        table.get_mut(id).is_recursive = true;
        assert!(table.get(id).is_recursive);
    }
}
