//! The type system: type terms, kinds, unification, classes, inference,
//! alias/ownership analysis, and monomorphization.
//!
//! ## Contents
//!
//! - this module - the type-term arena and structural operations
//! - [`kind`] - the second-level kind system
//! - [`unify`] - unification, instantiation, generalization
//! - [`class`] - type classes and instances
//! - [`base_module`] - the pre-compiled prelude
//! - [`alias`] - alias sets and the ownership checker
//! - [`infer`] - Hindley-Milner inference (phase E)
//! - [`monomorphize`] - specialization by cloning (phase F)

pub mod alias;
pub mod base_module;
pub mod class;
pub mod infer;
pub mod kind;
pub mod monomorphize;
pub mod unify;

use crate::base::{Arena, Idx, Symbol};
use crate::syntax::scope::ScopeId;
use crate::syntax::symbol::{SymbolId, SymbolTable};

pub type TypeId = Idx<Type>;

/// Order of a type variable, used by the recursive-initializer check and
/// the in-place-update restriction on local functional expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TypeOrder {
    /// Not yet constrained either way.
    #[default]
    Poly,
    /// No arrow at the top.
    Zero,
    /// Known to be (or contain) a function.
    Higher,
}

/// A unification variable. `bound` is the union-find parent link; `find`
/// chases it with path compression.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeVar {
    /// The symbol naming this variable, when it has one (signature vars
    /// do; fresh inference vars get an anonymous symbol).
    pub symbol: Option<SymbolId>,
    pub bound: Option<TypeId>,
    /// Rigid variables come from user-written signatures and may never be
    /// bound by unification.
    pub is_rigid: bool,
    /// The scope the variable was introduced in; generalization closes
    /// over variables not bound in an enclosing scope.
    pub scope: Option<ScopeId>,
    pub order: TypeOrder,
    /// Class symbols constraining this variable.
    pub context: Vec<SymbolId>,
    /// Arity hint for method instantiation.
    pub arity: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeTerm {
    Var(TypeVar),
    /// Curried application, the view the AST translates to; uncurried into
    /// `Con` argument vectors before kind checking.
    App { left: TypeId, right: TypeId },
    Fun { arg: TypeId, result: TypeId },
    /// Named type constructor applied to its argument vector. The vector
    /// length matches the declared kind-arity exactly.
    Con { symbol: SymbolId, args: Vec<TypeId> },
    /// Universal quantifier with the class context of its variable.
    For {
        var: SymbolId,
        context: Vec<SymbolId>,
        body: TypeId,
    },
    /// Type-level natural number (array sizes).
    Nat(u64),
    /// Type-level symbol.
    Sym(Symbol),
}

/// A type term plus its kind and ownership annotations (both themselves
/// types: the kind drawn from kind `Kind`, the ownership from kind
/// `Uniqueness`).
#[derive(Clone, Debug)]
pub struct Type {
    pub term: TypeTerm,
    pub kind_of: Option<TypeId>,
    pub ownership: Option<TypeId>,
}

/// Arena storage for all type terms of a compilation.
#[derive(Debug, Default)]
pub struct TypeArena {
    arena: Arena<Type>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, term: TypeTerm) -> TypeId {
        self.arena.alloc(Type {
            term,
            kind_of: None,
            ownership: None,
        })
    }

    pub fn get(&self, id: TypeId) -> &Type {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        self.arena.get_mut(id)
    }

    pub fn term(&self, id: TypeId) -> &TypeTerm {
        &self.arena.get(id).term
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn mk_var(&mut self, symbol: Option<SymbolId>, scope: Option<ScopeId>) -> TypeId {
        self.alloc(TypeTerm::Var(TypeVar {
            symbol,
            bound: None,
            is_rigid: false,
            scope,
            order: TypeOrder::Poly,
            context: Vec::new(),
            arity: None,
        }))
    }

    pub fn mk_rigid_var(&mut self, symbol: SymbolId, scope: Option<ScopeId>) -> TypeId {
        let id = self.mk_var(Some(symbol), scope);
        match &mut self.get_mut(id).term {
            TypeTerm::Var(var) => var.is_rigid = true,
            _ => unreachable!(),
        }
        id
    }

    pub fn mk_app(&mut self, left: TypeId, right: TypeId) -> TypeId {
        self.alloc(TypeTerm::App { left, right })
    }

    pub fn mk_fun(&mut self, arg: TypeId, result: TypeId) -> TypeId {
        self.alloc(TypeTerm::Fun { arg, result })
    }

    /// Build `a1 -> a2 -> ... -> result`, right-associated.
    pub fn mk_fun_chain(&mut self, args: &[TypeId], result: TypeId) -> TypeId {
        let mut acc = result;
        for &arg in args.iter().rev() {
            acc = self.mk_fun(arg, acc);
        }
        acc
    }

    pub fn mk_con(&mut self, symbol: SymbolId, args: Vec<TypeId>) -> TypeId {
        self.alloc(TypeTerm::Con { symbol, args })
    }

    pub fn mk_for_all(&mut self, var: SymbolId, context: Vec<SymbolId>, body: TypeId) -> TypeId {
        self.alloc(TypeTerm::For { var, context, body })
    }

    pub fn mk_nat(&mut self, value: u64) -> TypeId {
        self.alloc(TypeTerm::Nat(value))
    }

    pub fn mk_sym(&mut self, value: Symbol) -> TypeId {
        self.alloc(TypeTerm::Sym(value))
    }

    // ------------------------------------------------------------------
    // Union-find
    // ------------------------------------------------------------------

    /// Chase bound links to the representative, compressing the path.
    /// Returns the last unbound node (a free var stays itself).
    pub fn find(&mut self, id: TypeId) -> TypeId {
        let mut current = id;
        loop {
            match &self.get(current).term {
                TypeTerm::Var(TypeVar {
                    bound: Some(next), ..
                }) => current = *next,
                _ => break,
            }
        }
        // Path compression: repoint every var on the chain at the root.
        let root = current;
        let mut walk = id;
        while walk != root {
            match &mut self.get_mut(walk).term {
                TypeTerm::Var(var) => {
                    let next = var.bound.expect("interior chain node must be bound");
                    var.bound = Some(root);
                    walk = next;
                }
                _ => break,
            }
        }
        root
    }

    /// Non-compressing find for read-only contexts.
    pub fn find_const(&self, id: TypeId) -> TypeId {
        let mut current = id;
        loop {
            match &self.get(current).term {
                TypeTerm::Var(TypeVar {
                    bound: Some(next), ..
                }) => current = *next,
                _ => return current,
            }
        }
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    /// Structural duplication into fresh nodes, chasing bound vars first.
    /// Idempotent up to structure: copying a copy yields the same shape.
    pub fn deep_copy(&mut self, id: TypeId) -> TypeId {
        let id = self.find(id);
        let kind_of = self.get(id).kind_of;
        let ownership = self.get(id).ownership;
        let term = self.get(id).term.clone();
        let new_id = match term {
            TypeTerm::Var(var) => self.alloc(TypeTerm::Var(TypeVar {
                bound: None,
                context: var.context.clone(),
                ..var
            })),
            TypeTerm::App { left, right } => {
                let left = self.deep_copy(left);
                let right = self.deep_copy(right);
                self.mk_app(left, right)
            }
            TypeTerm::Fun { arg, result } => {
                let arg = self.deep_copy(arg);
                let result = self.deep_copy(result);
                self.mk_fun(arg, result)
            }
            TypeTerm::Con { symbol, args } => {
                let args = args.iter().map(|&a| self.deep_copy(a)).collect();
                self.mk_con(symbol, args)
            }
            TypeTerm::For { var, context, body } => {
                let body = self.deep_copy(body);
                self.mk_for_all(var, context, body)
            }
            TypeTerm::Nat(value) => self.mk_nat(value),
            TypeTerm::Sym(value) => self.mk_sym(value.clone()),
        };
        self.get_mut(new_id).kind_of = kind_of;
        self.get_mut(new_id).ownership = ownership;
        new_id
    }

    /// Skip leading `For` binders.
    pub fn strip_for_all(&self, mut id: TypeId) -> TypeId {
        loop {
            id = self.find_const(id);
            match self.term(id) {
                TypeTerm::For { body, .. } => id = *body,
                _ => return id,
            }
        }
    }

    /// A type is polymorphic when an unbound variable survives anywhere
    /// inside it. A quantifier whose variable was later bound (ambiguity
    /// defaulting) no longer counts.
    pub fn is_polymorphic(&self, id: TypeId) -> bool {
        let id = self.find_const(id);
        match self.term(id) {
            TypeTerm::Var(_) => true,
            TypeTerm::For { body, .. } => self.is_polymorphic(*body),
            TypeTerm::App { left, right } => {
                self.is_polymorphic(*left) || self.is_polymorphic(*right)
            }
            TypeTerm::Fun { arg, result } => {
                self.is_polymorphic(*arg) || self.is_polymorphic(*result)
            }
            TypeTerm::Con { args, .. } => args.iter().any(|&a| self.is_polymorphic(a)),
            TypeTerm::Nat(_) | TypeTerm::Sym(_) => false,
        }
    }

    /// Copy types are enum-only data types; they never alias.
    pub fn is_copy_type(&self, id: TypeId, symbols: &SymbolTable) -> bool {
        let id = self.find_const(id);
        match self.term(id) {
            TypeTerm::Con { symbol, .. } => symbols.get(*symbol).is_enum,
            _ => false,
        }
    }

    /// Result type after all arrows.
    pub fn fully_applied_result(&self, mut id: TypeId) -> TypeId {
        loop {
            id = self.find_const(id);
            match self.term(id) {
                TypeTerm::Fun { result, .. } => id = *result,
                _ => return id,
            }
        }
    }

    /// Argument types of an arrow chain, outermost first.
    pub fn fun_args(&self, mut id: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        loop {
            id = self.find_const(id);
            match self.term(id) {
                TypeTerm::Fun { arg, result } => {
                    out.push(*arg);
                    id = *result;
                }
                _ => return out,
            }
        }
    }

    /// True when the (stripped) type has an arrow at the top.
    pub fn is_fun(&self, id: TypeId) -> bool {
        let id = self.find_const(self.strip_for_all(id));
        matches!(self.term(id), TypeTerm::Fun { .. })
    }

    /// Flatten a spine of curried `App`s over a `Con` head into a single
    /// `Con` with the combined argument vector. A spine whose head is not
    /// a `Con` (a free variable) is returned unchanged; callers re-run
    /// kind inference on flattened results.
    pub fn uncurry_app(&mut self, id: TypeId) -> TypeId {
        let id = self.find(id);
        let mut extra_args = Vec::new();
        let mut head = id;
        loop {
            head = self.find(head);
            match self.term(head) {
                TypeTerm::App { left, right } => {
                    extra_args.push(*right);
                    head = *left;
                }
                _ => break,
            }
        }
        extra_args.reverse();
        match self.term(head).clone() {
            TypeTerm::Con { symbol, mut args } => {
                if extra_args.is_empty() {
                    return head;
                }
                args.extend(extra_args);
                self.mk_con(symbol, args)
            }
            _ => id,
        }
    }

    /// The curried view of an applied `Con`: peel the last argument into
    /// an `App`. None for nullary constructors.
    pub fn curry_con(&mut self, id: TypeId) -> Option<TypeId> {
        let id = self.find(id);
        let TypeTerm::Con { symbol, args } = self.term(id).clone() else {
            return None;
        };
        let (&last, init) = args.split_last()?;
        let inner = self.mk_con(symbol, init.to_vec());
        Some(self.mk_app(inner, last))
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render a type for diagnostics. Variable names are normalized so the
    /// same variable never prints under two different names.
    pub fn display(&self, id: TypeId, symbols: &SymbolTable) -> String {
        let mut names: Vec<TypeId> = Vec::new();
        let mut out = String::new();
        self.display_go(id, symbols, &mut names, false, &mut out);
        out
    }

    fn var_display_name(index: usize) -> String {
        let letter = (b'a' + (index % 26) as u8) as char;
        if index < 26 {
            letter.to_string()
        } else {
            format!("{}{}", letter, index / 26)
        }
    }

    fn display_go(
        &self,
        id: TypeId,
        symbols: &SymbolTable,
        names: &mut Vec<TypeId>,
        parens: bool,
        out: &mut String,
    ) {
        let id = self.find_const(id);
        match self.term(id) {
            TypeTerm::Var(_) => {
                let index = match names.iter().position(|&n| n == id) {
                    Some(i) => i,
                    None => {
                        names.push(id);
                        names.len() - 1
                    }
                };
                out.push_str(&Self::var_display_name(index));
            }
            TypeTerm::App { left, right } => {
                if parens {
                    out.push('(');
                }
                self.display_go(*left, symbols, names, false, out);
                out.push(' ');
                self.display_go(*right, symbols, names, true, out);
                if parens {
                    out.push(')');
                }
            }
            TypeTerm::Fun { arg, result } => {
                if parens {
                    out.push('(');
                }
                self.display_go(*arg, symbols, names, true, out);
                out.push_str(" -> ");
                self.display_go(*result, symbols, names, false, out);
                if parens {
                    out.push(')');
                }
            }
            TypeTerm::Con { symbol, args } => {
                if parens && !args.is_empty() {
                    out.push('(');
                }
                out.push_str(symbols.source_name(*symbol).as_str());
                for &arg in args {
                    out.push(' ');
                    self.display_go(arg, symbols, names, true, out);
                }
                if parens && !args.is_empty() {
                    out.push(')');
                }
            }
            TypeTerm::For { body, .. } => {
                self.display_go(*body, symbols, names, parens, out);
            }
            TypeTerm::Nat(value) => out.push_str(&value.to_string()),
            TypeTerm::Sym(value) => out.push_str(value.as_str()),
        }
    }

    /// Mangle a ground type into a name suffix component. Injective over
    /// structurally distinct ground types: constructor names are unique,
    /// and the bracket/comma structure encodes the tree unambiguously.
    pub fn mangled_string(&self, id: TypeId, symbols: &SymbolTable) -> String {
        let id = self.find_const(id);
        match self.term(id) {
            TypeTerm::Con { symbol, args } => {
                let mut out = symbols.source_name(*symbol).as_str().to_string();
                if !args.is_empty() {
                    out.push('<');
                    for (i, &arg) in args.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str(&self.mangled_string(arg, symbols));
                    }
                    out.push('>');
                }
                out
            }
            TypeTerm::Fun { arg, result } => format!(
                "({}->{})",
                self.mangled_string(*arg, symbols),
                self.mangled_string(*result, symbols)
            ),
            TypeTerm::App { left, right } => format!(
                "({} {})",
                self.mangled_string(*left, symbols),
                self.mangled_string(*right, symbols)
            ),
            TypeTerm::Nat(value) => value.to_string(),
            TypeTerm::Sym(value) => value.as_str().to_string(),
            TypeTerm::Var(var) => match var.symbol {
                Some(symbol) => symbols.source_name(symbol).as_str().to_string(),
                None => "_".to_string(),
            },
            TypeTerm::For { body, .. } => self.mangled_string(*body, symbols),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Interner, SourceSpan};

    fn con(
        arena: &mut TypeArena,
        symbols: &mut SymbolTable,
        interner: &mut Interner,
        name: &str,
        args: Vec<TypeId>,
    ) -> TypeId {
        let sym = interner.intern(name);
        let module = interner.intern("Necro.Base");
        let id = symbols.fresh(sym, module, SourceSpan::NULL);
        arena.mk_con(id, args)
    }

    #[test]
    fn test_find_chases_bound_chain() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut arena = TypeArena::new();
        let int_ty = con(&mut arena, &mut symbols, &mut interner, "Int", vec![]);
        let v1 = arena.mk_var(None, None);
        let v2 = arena.mk_var(None, None);
        // v1 -> v2 -> Int
        match &mut arena.get_mut(v1).term {
            TypeTerm::Var(var) => var.bound = Some(v2),
            _ => unreachable!(),
        }
        match &mut arena.get_mut(v2).term {
            TypeTerm::Var(var) => var.bound = Some(int_ty),
            _ => unreachable!(),
        }
        assert_eq!(arena.find(v1), int_ty);
        // After compression v1 points straight at the root.
        match arena.term(v1) {
            TypeTerm::Var(var) => assert_eq!(var.bound, Some(int_ty)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_deep_copy_is_structural() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut arena = TypeArena::new();
        let int_ty = con(&mut arena, &mut symbols, &mut interner, "Int", vec![]);
        let fun = arena.mk_fun(int_ty, int_ty);
        let copy1 = arena.deep_copy(fun);
        let copy2 = arena.deep_copy(copy1);
        assert_ne!(copy1, fun);
        assert_eq!(
            arena.mangled_string(copy1, &symbols),
            arena.mangled_string(copy2, &symbols)
        );
    }

    #[test]
    fn test_is_polymorphic() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut arena = TypeArena::new();
        let int_ty = con(&mut arena, &mut symbols, &mut interner, "Int", vec![]);
        let var = arena.mk_var(None, None);
        let maybe_var = con(&mut arena, &mut symbols, &mut interner, "Maybe", vec![var]);
        let maybe_int = con(&mut arena, &mut symbols, &mut interner, "Maybe", vec![int_ty]);
        assert!(arena.is_polymorphic(maybe_var));
        assert!(!arena.is_polymorphic(maybe_int));
    }

    #[test]
    fn test_uncurry_app() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut arena = TypeArena::new();
        let int_ty = con(&mut arena, &mut symbols, &mut interner, "Int", vec![]);
        let maybe = con(&mut arena, &mut symbols, &mut interner, "Maybe", vec![]);
        let app = arena.mk_app(maybe, int_ty);
        let uncurried = arena.uncurry_app(app);
        match arena.term(uncurried) {
            TypeTerm::Con { args, .. } => assert_eq!(args.len(), 1),
            other => panic!("expected Con, got {other:?}"),
        }
    }

    #[test]
    fn test_mangled_names_distinct() {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut arena = TypeArena::new();
        let int_ty = con(&mut arena, &mut symbols, &mut interner, "Int", vec![]);
        let float_ty = con(&mut arena, &mut symbols, &mut interner, "Float", vec![]);
        let maybe_int = con(&mut arena, &mut symbols, &mut interner, "Maybe", vec![int_ty]);
        let maybe_float = con(&mut arena, &mut symbols, &mut interner, "Maybe", vec![float_ty]);
        let fun = arena.mk_fun(int_ty, float_ty);
        let names = [
            arena.mangled_string(maybe_int, &symbols),
            arena.mangled_string(maybe_float, &symbols),
            arena.mangled_string(fun, &symbols),
        ];
        assert_eq!(names[0], "Maybe<Int>");
        assert_eq!(names[1], "Maybe<Float>");
        assert_eq!(names[2], "(Int->Float)");
        assert!(names.iter().collect::<std::collections::HashSet<_>>().len() == 3);
    }
}
