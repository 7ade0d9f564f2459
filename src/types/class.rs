//! Type classes and instances.
//!
//! Classes and instances are records in their own arenas, referenced from
//! `AstSymbol` metadata. Super-class relations (`Monad :< Applicative :<
//! Functor`) are ordered class lists expanded during instance resolution.

use rustc_hash::FxHashMap;

use crate::base::{Arena, Idx};
use crate::syntax::ast::AstId;
use crate::syntax::symbol::SymbolId;

pub type ClassId = Idx<TypeClass>;
pub type InstanceId = Idx<ClassInstance>;

/// A type-class declaration.
#[derive(Clone, Debug)]
pub struct TypeClass {
    /// The symbol naming the class.
    pub class_symbol: SymbolId,
    /// The class variable (`a` in `class Num a`).
    pub class_var: SymbolId,
    /// Method symbols, declaration order.
    pub members: Vec<SymbolId>,
    /// Direct super-classes, declaration order.
    pub super_classes: Vec<SymbolId>,
    pub ast: Option<AstId>,
}

/// An instance declaration `instance C T`.
#[derive(Clone, Debug)]
pub struct ClassInstance {
    /// The synthesized `Class@Data` symbol the instance is registered
    /// under.
    pub instance_symbol: SymbolId,
    pub class_symbol: SymbolId,
    /// The instance head's type constructor.
    pub data_type_symbol: SymbolId,
    /// Method name -> implementing binding.
    pub method_bindings: Vec<(SymbolId, SymbolId)>,
    pub ast: Option<AstId>,
}

impl ClassInstance {
    /// The binding implementing `method`, if the instance declares one.
    pub fn method_binding(&self, method: SymbolId) -> Option<SymbolId> {
        self.method_bindings
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, binding)| *binding)
    }
}

/// Arena storage for classes and instances, with the instance lookup
/// index keyed by (class, data type).
#[derive(Debug, Default)]
pub struct ClassTable {
    classes: Arena<TypeClass>,
    instances: Arena<ClassInstance>,
    by_head: FxHashMap<(SymbolId, SymbolId), InstanceId>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class(&mut self, class: TypeClass) -> ClassId {
        self.classes.alloc(class)
    }

    pub fn insert_instance(&mut self, instance: ClassInstance) -> InstanceId {
        let key = (instance.class_symbol, instance.data_type_symbol);
        let id = self.instances.alloc(instance);
        self.by_head.insert(key, id);
        id
    }

    pub fn class(&self, id: ClassId) -> &TypeClass {
        self.classes.get(id)
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut TypeClass {
        self.classes.get_mut(id)
    }

    pub fn instance(&self, id: InstanceId) -> &ClassInstance {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> &mut ClassInstance {
        self.instances.get_mut(id)
    }

    /// Find the instance of `class_symbol` for `data_type_symbol`.
    pub fn find_instance(
        &self,
        class_symbol: SymbolId,
        data_type_symbol: SymbolId,
    ) -> Option<InstanceId> {
        self.by_head.get(&(class_symbol, data_type_symbol)).copied()
    }

    /// All super-classes of `class`, direct and transitive, in expansion
    /// order without duplicates.
    pub fn expand_super_classes(&self, class: ClassId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut work: Vec<SymbolId> = self.class(class).super_classes.clone();
        while let Some(super_symbol) = work.pop() {
            if out.contains(&super_symbol) {
                continue;
            }
            out.push(super_symbol);
            if let Some((_, super_class)) = self
                .classes
                .iter()
                .find(|(_, c)| c.class_symbol == super_symbol)
            {
                work.extend(super_class.super_classes.iter().copied());
            }
        }
        out
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &TypeClass)> {
        self.classes.iter()
    }

    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &ClassInstance)> {
        self.instances.iter()
    }
}
