//! The Core IR and its passes.
//!
//! Core is the minimal, monomorphic representation the middle end rewrites:
//! lambda, application, let, case, bind, data declarations, and loops. The
//! root of a Core module is a chain of `Let` nodes (each binding a data
//! declaration or a value) terminating in `None`.
//!
//! ## Contents
//!
//! - this module - node types, the arena, constructors, deep copy
//! - [`translate`] - AST to Core lowering (phase G)
//! - [`check`] - post-translation type sanity checking
//! - [`simplify`] - the pre-simplifier (phase H)
//! - [`lambda_lift`] - closing nested lambdas (phase I)
//! - [`defunctionalize`] - first-order rewriting (phase J)
//! - [`state`] - state analysis and deep-copy synthesis (phase K)

pub mod check;
pub mod defunctionalize;
pub mod lambda_lift;
pub mod simplify;
pub mod state;
pub mod translate;

use crate::base::{Arena, Idx, Symbol};
use crate::syntax::symbol::StateType;
use crate::types::{TypeArena, TypeId};

pub type CoreId = Idx<CoreAst>;
pub type CoreSymbolId = Idx<CoreAstSymbol>;

/// The Core analogue of `AstSymbol`, intentionally decoupled so downstream
/// rewrites never reach back into front-end metadata.
#[derive(Clone, Debug)]
pub struct CoreAstSymbol {
    pub name: Symbol,
    pub source_name: Symbol,
    pub ty: Option<TypeId>,
    /// The front-end symbol this one was lowered from, when any. Passes
    /// use it to recognize well-known base bindings.
    pub ast_symbol: Option<crate::syntax::symbol::SymbolId>,
    /// The bind or data declaration this symbol names.
    pub ast: Option<CoreId>,
    pub arity: usize,
    pub con_num: usize,
    pub is_constructor: bool,
    pub is_enum: bool,
    pub is_wrapper: bool,
    pub is_primitive: bool,
    pub is_recursive: bool,
    pub is_deep_copy_fn: bool,
    pub state_type: StateType,
    /// Lexically enclosing binder, filled during state analysis.
    pub outer: Option<CoreSymbolId>,
    /// When set, every use of this symbol rewrites to a copy of this
    /// expression (pre-simplifier and defunctionalization inlining).
    pub inline_ast: Option<CoreId>,
    /// Synthesized copy routine for this data type, once built.
    pub deep_copy_fn: Option<CoreSymbolId>,
}

impl CoreAstSymbol {
    pub fn new(name: Symbol, ty: Option<TypeId>) -> Self {
        CoreAstSymbol {
            source_name: name.clone(),
            name,
            ty,
            ast_symbol: None,
            ast: None,
            arity: 0,
            con_num: 0,
            is_constructor: false,
            is_enum: false,
            is_wrapper: false,
            is_primitive: false,
            is_recursive: false,
            is_deep_copy_fn: false,
            state_type: StateType::Constant,
            outer: None,
            inline_ast: None,
            deep_copy_fn: None,
        }
    }
}

/// Arena storage for Core symbols.
#[derive(Debug, Default)]
pub struct CoreSymbolTable {
    arena: Arena<CoreAstSymbol>,
}

impl CoreSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: CoreAstSymbol) -> CoreSymbolId {
        self.arena.alloc(symbol)
    }

    pub fn get(&self, id: CoreSymbolId) -> &CoreAstSymbol {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: CoreSymbolId) -> &mut CoreAstSymbol {
        self.arena.get_mut(id)
    }

    pub fn name(&self, id: CoreSymbolId) -> &Symbol {
        &self.arena.get(id).name
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoreSymbolId, &CoreAstSymbol)> {
        self.arena.iter()
    }
}

/// Literal constants in Core.
#[derive(Clone, Debug, PartialEq)]
pub enum CoreLiteral {
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    String(Symbol),
    /// Array literal elements.
    Array(Vec<CoreId>),
}

/// Loop shape of a `Loop` node.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopKind {
    For {
        index_pat: CoreId,
        range_init: CoreId,
        max_loops: u64,
    },
    While { condition: CoreId },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CoreKind {
    Var { symbol: CoreSymbolId },
    Lit { value: CoreLiteral },
    App { function: CoreId, argument: CoreId },
    /// Single-argument lambda; `arg` is a `Var` node binding the
    /// parameter.
    Lam { arg: CoreId, body: CoreId },
    /// Non-recursive single binding with a body. `body` is `None` at the
    /// end of the top-level chain.
    Let { bind: CoreId, body: Option<CoreId> },
    Bind {
        symbol: CoreSymbolId,
        expr: CoreId,
        initializer: Option<CoreId>,
    },
    /// A mutually recursive nest of binds.
    BindRec { binds: Vec<CoreId> },
    Case { expr: CoreId, alts: Vec<CoreId> },
    /// `pat = None` is the wildcard alternative.
    CaseAlt { pat: Option<CoreId>, body: CoreId },
    DataDecl {
        symbol: CoreSymbolId,
        cons: Vec<CoreId>,
    },
    DataCon {
        symbol: CoreSymbolId,
        con_ty: TypeId,
        data_type_ty: TypeId,
    },
    Loop {
        loop_kind: LoopKind,
        value_pat: CoreId,
        value_init: CoreId,
        body: CoreId,
    },
}

#[derive(Clone, Debug)]
pub struct CoreAst {
    pub kind: CoreKind,
    pub ty: Option<TypeId>,
}

/// The Core arena for one module plus its root let-chain.
#[derive(Debug, Default)]
pub struct CoreArena {
    nodes: Arena<CoreAst>,
    pub root: Option<CoreId>,
}

impl CoreArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: CoreKind, ty: Option<TypeId>) -> CoreId {
        self.nodes.alloc(CoreAst { kind, ty })
    }

    pub fn get(&self, id: CoreId) -> &CoreAst {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: CoreId) -> &mut CoreAst {
        self.nodes.get_mut(id)
    }

    pub fn kind(&self, id: CoreId) -> &CoreKind {
        &self.nodes.get(id).kind
    }

    pub fn ty(&self, id: CoreId) -> Option<TypeId> {
        self.nodes.get(id).ty
    }

    pub fn set_ty(&mut self, id: CoreId, ty: TypeId) {
        self.nodes.get_mut(id).ty = Some(ty);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn create_var(&mut self, symbol: CoreSymbolId, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::Var { symbol }, ty)
    }

    pub fn create_lit(&mut self, value: CoreLiteral, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::Lit { value }, ty)
    }

    pub fn create_app(&mut self, function: CoreId, argument: CoreId, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::App { function, argument }, ty)
    }

    /// Apply `function` to `args`, left to right.
    pub fn create_apps(&mut self, function: CoreId, args: &[CoreId]) -> CoreId {
        let mut acc = function;
        for &arg in args {
            acc = self.create_app(acc, arg, None);
        }
        acc
    }

    pub fn create_lam(&mut self, arg: CoreId, body: CoreId, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::Lam { arg, body }, ty)
    }

    pub fn create_bind(
        &mut self,
        symbol: CoreSymbolId,
        expr: CoreId,
        initializer: Option<CoreId>,
        ty: Option<TypeId>,
    ) -> CoreId {
        self.alloc(
            CoreKind::Bind {
                symbol,
                expr,
                initializer,
            },
            ty,
        )
    }

    pub fn create_let(&mut self, bind: CoreId, body: Option<CoreId>, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::Let { bind, body }, ty)
    }

    pub fn create_case(&mut self, expr: CoreId, alts: Vec<CoreId>, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::Case { expr, alts }, ty)
    }

    pub fn create_case_alt(&mut self, pat: Option<CoreId>, body: CoreId, ty: Option<TypeId>) -> CoreId {
        self.alloc(CoreKind::CaseAlt { pat, body }, ty)
    }

    pub fn create_data_decl(
        &mut self,
        symbol: CoreSymbolId,
        cons: Vec<CoreId>,
        ty: Option<TypeId>,
    ) -> CoreId {
        self.alloc(CoreKind::DataDecl { symbol, cons }, ty)
    }

    pub fn create_data_con(
        &mut self,
        symbol: CoreSymbolId,
        con_ty: TypeId,
        data_type_ty: TypeId,
    ) -> CoreId {
        self.alloc(
            CoreKind::DataCon {
                symbol,
                con_ty,
                data_type_ty,
            },
            Some(con_ty),
        )
    }

    /// Number of leading lambdas of a bind's expression.
    pub fn num_args(&self, bind: CoreId) -> usize {
        let CoreKind::Bind { expr, .. } = self.kind(bind) else {
            return 0;
        };
        let mut count = 0;
        let mut current = *expr;
        while let CoreKind::Lam { body, .. } = self.kind(current) {
            count += 1;
            current = *body;
        }
        count
    }

    /// Children in structural order.
    pub fn children(&self, id: CoreId) -> Vec<CoreId> {
        let mut out = Vec::new();
        match self.kind(id) {
            CoreKind::Var { .. } => {}
            CoreKind::Lit { value } => {
                if let CoreLiteral::Array(elements) = value {
                    out.extend(elements);
                }
            }
            CoreKind::App { function, argument } => out.extend([*function, *argument]),
            CoreKind::Lam { arg, body } => out.extend([*arg, *body]),
            CoreKind::Let { bind, body } => {
                out.push(*bind);
                out.extend(body);
            }
            CoreKind::Bind {
                expr, initializer, ..
            } => {
                out.extend(initializer);
                out.push(*expr);
            }
            CoreKind::BindRec { binds } => out.extend(binds),
            CoreKind::Case { expr, alts } => {
                out.push(*expr);
                out.extend(alts);
            }
            CoreKind::CaseAlt { pat, body } => {
                out.extend(pat);
                out.push(*body);
            }
            CoreKind::DataDecl { cons, .. } => out.extend(cons),
            CoreKind::DataCon { .. } => {}
            CoreKind::Loop {
                loop_kind,
                value_pat,
                value_init,
                body,
            } => {
                match loop_kind {
                    LoopKind::For {
                        index_pat,
                        range_init,
                        ..
                    } => out.extend([*index_pat, *range_init]),
                    LoopKind::While { condition } => out.push(*condition),
                }
                out.extend([*value_pat, *value_init, *body]);
            }
        }
        out
    }

    /// Structural duplication into fresh nodes. Symbols are shared, not
    /// renamed; callers rename binders when that matters.
    pub fn deep_copy(&mut self, id: CoreId) -> CoreId {
        let ty = self.ty(id);
        let kind = self.kind(id).clone();
        let kind = match kind {
            CoreKind::Var { symbol } => CoreKind::Var { symbol },
            CoreKind::Lit { value } => {
                let value = match value {
                    CoreLiteral::Array(elements) => CoreLiteral::Array(
                        elements.iter().map(|&e| self.deep_copy(e)).collect(),
                    ),
                    other => other,
                };
                CoreKind::Lit { value }
            }
            CoreKind::App { function, argument } => CoreKind::App {
                function: self.deep_copy(function),
                argument: self.deep_copy(argument),
            },
            CoreKind::Lam { arg, body } => CoreKind::Lam {
                arg: self.deep_copy(arg),
                body: self.deep_copy(body),
            },
            CoreKind::Let { bind, body } => CoreKind::Let {
                bind: self.deep_copy(bind),
                body: body.map(|b| self.deep_copy(b)),
            },
            CoreKind::Bind {
                symbol,
                expr,
                initializer,
            } => CoreKind::Bind {
                symbol,
                expr: self.deep_copy(expr),
                initializer: initializer.map(|i| self.deep_copy(i)),
            },
            CoreKind::BindRec { binds } => CoreKind::BindRec {
                binds: binds.iter().map(|&b| self.deep_copy(b)).collect(),
            },
            CoreKind::Case { expr, alts } => CoreKind::Case {
                expr: self.deep_copy(expr),
                alts: alts.iter().map(|&a| self.deep_copy(a)).collect(),
            },
            CoreKind::CaseAlt { pat, body } => CoreKind::CaseAlt {
                pat: pat.map(|p| self.deep_copy(p)),
                body: self.deep_copy(body),
            },
            CoreKind::DataDecl { symbol, cons } => CoreKind::DataDecl {
                symbol,
                cons: cons.iter().map(|&c| self.deep_copy(c)).collect(),
            },
            CoreKind::DataCon {
                symbol,
                con_ty,
                data_type_ty,
            } => CoreKind::DataCon {
                symbol,
                con_ty,
                data_type_ty,
            },
            CoreKind::Loop {
                loop_kind,
                value_pat,
                value_init,
                body,
            } => {
                let loop_kind = match loop_kind {
                    LoopKind::For {
                        index_pat,
                        range_init,
                        max_loops,
                    } => LoopKind::For {
                        index_pat: self.deep_copy(index_pat),
                        range_init: self.deep_copy(range_init),
                        max_loops,
                    },
                    LoopKind::While { condition } => LoopKind::While {
                        condition: self.deep_copy(condition),
                    },
                };
                CoreKind::Loop {
                    loop_kind,
                    value_pat: self.deep_copy(value_pat),
                    value_init: self.deep_copy(value_init),
                    body: self.deep_copy(body),
                }
            }
        };
        self.alloc(kind, ty)
    }

    /// Render the tree for verbosity-gated dumps.
    pub fn pretty_print(&self, id: CoreId, symbols: &CoreSymbolTable, types: &TypeArena) -> String {
        let mut out = String::new();
        self.pretty_go(id, symbols, types, 0, &mut out);
        out
    }

    fn pretty_go(
        &self,
        id: CoreId,
        symbols: &CoreSymbolTable,
        types: &TypeArena,
        depth: usize,
        out: &mut String,
    ) {
        let _ = types;
        let indent = "  ".repeat(depth);
        match self.kind(id) {
            CoreKind::Var { symbol } => {
                out.push_str(symbols.name(*symbol).as_str());
            }
            CoreKind::Lit { value } => out.push_str(&format!("{value:?}")),
            CoreKind::App { function, argument } => {
                out.push('(');
                self.pretty_go(*function, symbols, types, depth, out);
                out.push(' ');
                self.pretty_go(*argument, symbols, types, depth, out);
                out.push(')');
            }
            CoreKind::Lam { arg, body } => {
                out.push_str("\\");
                self.pretty_go(*arg, symbols, types, depth, out);
                out.push_str(" -> ");
                self.pretty_go(*body, symbols, types, depth, out);
            }
            CoreKind::Let { bind, body } => {
                out.push_str(&format!("\n{indent}let "));
                self.pretty_go(*bind, symbols, types, depth + 1, out);
                if let Some(body) = body {
                    out.push_str(&format!("\n{indent}in"));
                    self.pretty_go(*body, symbols, types, depth, out);
                }
            }
            CoreKind::Bind { symbol, expr, initializer } => {
                out.push_str(symbols.name(*symbol).as_str());
                if let Some(initializer) = initializer {
                    out.push_str(" ~ ");
                    self.pretty_go(*initializer, symbols, types, depth, out);
                }
                out.push_str(" = ");
                self.pretty_go(*expr, symbols, types, depth, out);
            }
            CoreKind::BindRec { binds } => {
                out.push_str("rec {");
                for &bind in binds {
                    out.push(' ');
                    self.pretty_go(bind, symbols, types, depth, out);
                    out.push(';');
                }
                out.push_str(" }");
            }
            CoreKind::Case { expr, alts } => {
                out.push_str("case ");
                self.pretty_go(*expr, symbols, types, depth, out);
                out.push_str(" of");
                for &alt in alts {
                    out.push_str(&format!("\n{indent}  "));
                    self.pretty_go(alt, symbols, types, depth + 1, out);
                }
            }
            CoreKind::CaseAlt { pat, body } => {
                match pat {
                    Some(pat) => self.pretty_go(*pat, symbols, types, depth, out),
                    None => out.push('_'),
                }
                out.push_str(" -> ");
                self.pretty_go(*body, symbols, types, depth, out);
            }
            CoreKind::DataDecl { symbol, cons } => {
                out.push_str(&format!("data {}", symbols.name(*symbol)));
                for (i, &con) in cons.iter().enumerate() {
                    out.push_str(if i == 0 { " = " } else { " | " });
                    self.pretty_go(con, symbols, types, depth, out);
                }
            }
            CoreKind::DataCon { symbol, .. } => {
                out.push_str(symbols.name(*symbol).as_str());
            }
            CoreKind::Loop {
                loop_kind,
                value_pat,
                value_init,
                body,
            } => {
                match loop_kind {
                    LoopKind::For { max_loops, .. } => {
                        out.push_str(&format!("for[{max_loops}] "));
                    }
                    LoopKind::While { condition } => {
                        out.push_str("while ");
                        self.pretty_go(*condition, symbols, types, depth, out);
                        out.push(' ');
                    }
                }
                self.pretty_go(*value_pat, symbols, types, depth, out);
                out.push_str(" <- ");
                self.pretty_go(*value_init, symbols, types, depth, out);
                out.push_str(" do ");
                self.pretty_go(*body, symbols, types, depth, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Interner;

    #[test]
    fn test_num_args_counts_lams() {
        let mut interner = Interner::new();
        let mut symbols = CoreSymbolTable::new();
        let mut core = CoreArena::new();
        let f = symbols.insert(CoreAstSymbol::new(interner.intern("f"), None));
        let x = symbols.insert(CoreAstSymbol::new(interner.intern("x"), None));
        let y = symbols.insert(CoreAstSymbol::new(interner.intern("y"), None));
        let x_var = core.create_var(x, None);
        let y_var = core.create_var(y, None);
        let body = core.create_var(x, None);
        let inner = core.create_lam(y_var, body, None);
        let outer = core.create_lam(x_var, inner, None);
        let bind = core.create_bind(f, outer, None, None);
        assert_eq!(core.num_args(bind), 2);
    }

    #[test]
    fn test_deep_copy_fresh_nodes() {
        let mut interner = Interner::new();
        let mut symbols = CoreSymbolTable::new();
        let mut core = CoreArena::new();
        let x = symbols.insert(CoreAstSymbol::new(interner.intern("x"), None));
        let var = core.create_var(x, None);
        let app = core.create_app(var, var, None);
        let copy = core.deep_copy(app);
        assert_ne!(copy, app);
        // Fresh nodes, same shape, shared symbols.
        let CoreKind::App { function, argument } = core.kind(copy) else {
            panic!("expected App");
        };
        assert_ne!(*function, var);
        assert_ne!(*argument, var);
        match (core.kind(*function), core.kind(*argument)) {
            (CoreKind::Var { symbol: f }, CoreKind::Var { symbol: a }) => {
                assert_eq!(*f, x);
                assert_eq!(*a, x);
            }
            other => panic!("expected Var children, got {other:?}"),
        }
    }
}
