//! The typed AST.
//!
//! Produced by reification (phase A) from the parse tree and annotated in
//! place by every phase up to monomorphization. Nodes live in an
//! [`AstArena`] and reference each other by [`AstId`]; named entities
//! reference their [`AstSymbol`](super::symbol::AstSymbol) by `SymbolId`.
//!
//! The variant set mirrors the surface language: declarations, patterns,
//! expressions, and type terms share one node type because patterns and
//! types reuse expression shapes (tuples, constructor application).

use crate::base::{Arena, Idx, SourceSpan, Symbol};
use crate::syntax::scope::ScopeId;
use crate::syntax::symbol::SymbolId;
use crate::types::TypeId;

pub type AstId = Idx<Ast>;

/// The role a variable occurrence plays. Declarations bind; the rest are
/// uses resolved by the renamer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    /// A use site in an expression.
    Var,
    /// A binding site (pattern variable, assignment LHS).
    Declaration,
    /// The variable of a type signature (`x` in `x :: Int`).
    Sig,
    /// A type-variable binding site (`a` in `data Maybe a`).
    TypeVarDeclaration,
    /// A free type variable in a signature.
    TypeFreeVar,
    /// The variable of a class-method signature.
    ClassSig,
}

/// The role a constructor identifier plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConKind {
    /// Term-level constructor use.
    Var,
    /// Constructor in a pattern.
    Pattern,
    /// Type-constructor use in a type term.
    TypeUse,
    /// Type-constructor binding site (data declaration head).
    TypeDeclaration,
}

/// Literal constants. Integer and rational literals only appear beneath the
/// `fromInt` / `fromRational` applications reification wraps around them.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Float(f64),
    Integer(i64),
    UInt(u64),
    Char(char),
    String(Symbol),
}

/// An instantiation substitution recorded at a use site during inference:
/// the quantified variable replaced and the fresh type it maps to.
/// Monomorphization replays these to pick specializations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstSub {
    pub var_to_replace: SymbolId,
    pub new_type: TypeId,
}

/// Uniqueness attribute written in a type term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeAttributeKind {
    Unique,
    Shared,
}

/// Where a type signature appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigKind {
    /// Free-standing `name :: type` signature.
    TypeSig,
    /// Method signature inside a class declaration.
    ClassSig,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AstKind {
    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------
    /// The root: all top-level declarations of the module, in source order.
    /// Replaced by `DeclarationGroupList` after dependency analysis.
    TopDecl { declarations: Vec<AstId> },

    /// A let/where declaration list, source order. Replaced by
    /// `DeclarationGroupList` after dependency analysis.
    DeclarationList { declarations: Vec<AstId> },

    /// Topologically ordered strongly-connected components.
    DeclarationGroupList { groups: Vec<AstId> },

    /// One strongly-connected component. More than one declaration means a
    /// mutually recursive nest.
    DeclarationGroup { declarations: Vec<AstId> },

    /// `name = rhs` or `name ~ init = rhs`.
    SimpleAssignment {
        symbol: SymbolId,
        initializer: Option<AstId>,
        rhs: AstId,
        is_recursive: bool,
    },

    /// `name p1 p2 ... = rhs`.
    ApatsAssignment {
        symbol: SymbolId,
        apats: Vec<AstId>,
        rhs: AstId,
        is_recursive: bool,
    },

    /// `pat = rhs` with a non-variable pattern on the left.
    PatAssignment { pat: AstId, rhs: AstId },

    /// Right-hand side: expression plus optional `where` declarations.
    Rhs {
        expression: AstId,
        declarations: Option<AstId>,
    },

    /// `name :: context => type`.
    TypeSignature {
        var: AstId,
        context: Vec<AstId>,
        ty: AstId,
        sig_kind: SigKind,
    },

    /// `data T a b = C1 ... | C2 ...`.
    DataDeclaration {
        symbol: SymbolId,
        simple_type: AstId,
        constructors: Vec<AstId>,
        is_recursive: bool,
    },

    /// `class Context => C a where decls`.
    TypeClassDeclaration {
        symbol: SymbolId,
        context: Vec<AstId>,
        class_var: AstId,
        declarations: Option<AstId>,
    },

    /// `instance Context => C T where decls`.
    TypeClassInstance {
        symbol: SymbolId,
        context: Vec<AstId>,
        class_conid: AstId,
        inst: AstId,
        declarations: Option<AstId>,
    },

    /// One `C a` constraint in a context.
    TypeClassContext { class_conid: AstId, var: AstId },

    // ------------------------------------------------------------------
    // Expressions and patterns
    // ------------------------------------------------------------------
    Variable {
        symbol: SymbolId,
        var_kind: VarKind,
        /// `~ init` on a pattern variable (recursive value).
        initializer: Option<AstId>,
        inst_subs: Vec<InstSub>,
    },

    ConId {
        symbol: SymbolId,
        con_kind: ConKind,
    },

    /// Constructor applied to arguments, in patterns and in type terms.
    Constructor { conid: AstId, args: Vec<AstId> },

    Constant { value: Constant },

    Wildcard,

    /// Left-associated application `function argument`.
    App { function: AstId, argument: AstId },

    /// Resolved binary operator application.
    BinOp {
        symbol: SymbolId,
        lhs: AstId,
        rhs: AstId,
        inst_subs: Vec<InstSub>,
    },

    /// Operator-constructor pattern (`l `Op` r` in a pattern position).
    BinOpSym { op: AstId, left: AstId, right: AstId },

    /// `(e op)`.
    OpLeftSection {
        symbol: SymbolId,
        left: AstId,
        inst_subs: Vec<InstSub>,
    },

    /// `(op e)`.
    OpRightSection {
        symbol: SymbolId,
        right: AstId,
        inst_subs: Vec<InstSub>,
    },

    IfThenElse {
        if_expr: AstId,
        then_expr: AstId,
        else_expr: AstId,
    },

    Lambda { apats: Vec<AstId>, expression: AstId },

    Let {
        declarations: AstId,
        expression: AstId,
    },

    Case {
        expression: AstId,
        alternatives: Vec<AstId>,
    },

    CaseAlternative { pat: AstId, body: AstId },

    Tuple { expressions: Vec<AstId> },

    /// List literal `[a, b, c]`.
    ExpressionList { expressions: Vec<AstId> },

    /// Array literal `{a, b, c}`.
    ExpressionArray { expressions: Vec<AstId> },

    /// Pattern-sequence literal, building a `Pattern` value.
    PatExpression { expressions: Vec<AstId> },

    /// Sequence literal, desugared through `seqTick`/`runSeq` at Core
    /// translation.
    SeqExpression { expressions: Vec<AstId> },

    /// `[from, then .. to]`.
    ArithmeticSequence {
        from: AstId,
        then: Option<AstId>,
        to: Option<AstId>,
    },

    Do { statements: Vec<AstId> },

    /// `name <- expression` inside do.
    BindAssignment { symbol: SymbolId, expression: AstId },

    /// `pat <- expression` inside do.
    PatBindAssignment { pat: AstId, expression: AstId },

    ForLoop {
        range_init: AstId,
        value_init: AstId,
        index_apat: AstId,
        value_apat: AstId,
        expression: AstId,
    },

    WhileLoop {
        value_init: AstId,
        value_apat: AstId,
        while_expression: AstId,
        do_expression: AstId,
    },

    // ------------------------------------------------------------------
    // Type terms
    // ------------------------------------------------------------------
    /// Data-declaration head: `T a b`.
    SimpleType {
        type_con: AstId,
        type_vars: Vec<AstId>,
    },

    /// Curried type application `ty arg`.
    TypeApp { ty: AstId, arg: AstId },

    /// `arg -> result`.
    FunctionType { arg: AstId, result: AstId },

    /// `.ty` / `*ty` uniqueness attribute.
    TypeAttribute {
        attributed_type: AstId,
        attribute: TypeAttributeKind,
    },
}

/// One AST node: the variant plus the per-node annotations phases fill in.
#[derive(Clone, Debug)]
pub struct Ast {
    pub kind: AstKind,
    pub span: SourceSpan,
    pub scope: Option<ScopeId>,
    pub ty: Option<TypeId>,
}

/// The typed-AST arena for one module, plus its root.
#[derive(Debug, Default)]
pub struct AstArena {
    pub nodes: Arena<Ast>,
    pub root: Option<AstId>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: AstKind, span: SourceSpan) -> AstId {
        self.nodes.alloc(Ast {
            kind,
            span,
            scope: None,
            ty: None,
        })
    }

    pub fn get(&self, id: AstId) -> &Ast {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: AstId) -> &mut Ast {
        self.nodes.get_mut(id)
    }

    pub fn kind(&self, id: AstId) -> &AstKind {
        &self.nodes.get(id).kind
    }

    pub fn span(&self, id: AstId) -> SourceSpan {
        self.nodes.get(id).span
    }

    pub fn ty(&self, id: AstId) -> Option<TypeId> {
        self.nodes.get(id).ty
    }

    pub fn set_ty(&mut self, id: AstId, ty: TypeId) {
        self.nodes.get_mut(id).ty = Some(ty);
    }

    // ------------------------------------------------------------------
    // Constructors used by reification, desugaring, and tests
    // ------------------------------------------------------------------

    pub fn create_var(&mut self, symbol: SymbolId, var_kind: VarKind, span: SourceSpan) -> AstId {
        self.alloc(
            AstKind::Variable {
                symbol,
                var_kind,
                initializer: None,
                inst_subs: Vec::new(),
            },
            span,
        )
    }

    pub fn create_conid(&mut self, symbol: SymbolId, con_kind: ConKind, span: SourceSpan) -> AstId {
        self.alloc(AstKind::ConId { symbol, con_kind }, span)
    }

    pub fn create_app(&mut self, function: AstId, argument: AstId, span: SourceSpan) -> AstId {
        self.alloc(AstKind::App { function, argument }, span)
    }

    /// Apply `function` to `args` left to right.
    pub fn create_apps(&mut self, function: AstId, args: &[AstId], span: SourceSpan) -> AstId {
        let mut acc = function;
        for &arg in args {
            acc = self.create_app(acc, arg, span);
        }
        acc
    }

    pub fn create_lambda(&mut self, apats: Vec<AstId>, expression: AstId, span: SourceSpan) -> AstId {
        self.alloc(AstKind::Lambda { apats, expression }, span)
    }

    pub fn create_rhs(&mut self, expression: AstId, declarations: Option<AstId>, span: SourceSpan) -> AstId {
        self.alloc(
            AstKind::Rhs {
                expression,
                declarations,
            },
            span,
        )
    }

    pub fn create_simple_assignment(
        &mut self,
        symbol: SymbolId,
        initializer: Option<AstId>,
        rhs: AstId,
        span: SourceSpan,
    ) -> AstId {
        self.alloc(
            AstKind::SimpleAssignment {
                symbol,
                initializer,
                rhs,
                is_recursive: false,
            },
            span,
        )
    }

    pub fn create_case(&mut self, expression: AstId, alternatives: Vec<AstId>, span: SourceSpan) -> AstId {
        self.alloc(
            AstKind::Case {
                expression,
                alternatives,
            },
            span,
        )
    }

    pub fn create_wildcard(&mut self, span: SourceSpan) -> AstId {
        self.alloc(AstKind::Wildcard, span)
    }

    /// Children of a node, in structural order. Used by generic walks
    /// (dependency analysis, free-variable computation).
    pub fn children(&self, id: AstId) -> Vec<AstId> {
        let mut out = Vec::new();
        match self.kind(id) {
            AstKind::TopDecl { declarations }
            | AstKind::DeclarationList { declarations }
            | AstKind::DeclarationGroup { declarations } => out.extend(declarations),
            AstKind::DeclarationGroupList { groups } => out.extend(groups),
            AstKind::SimpleAssignment {
                initializer, rhs, ..
            } => {
                out.extend(initializer);
                out.push(*rhs);
            }
            AstKind::ApatsAssignment { apats, rhs, .. } => {
                out.extend(apats);
                out.push(*rhs);
            }
            AstKind::PatAssignment { pat, rhs } => out.extend([*pat, *rhs]),
            AstKind::Rhs {
                expression,
                declarations,
            } => {
                out.extend(declarations);
                out.push(*expression);
            }
            AstKind::TypeSignature {
                var, context, ty, ..
            } => {
                out.push(*var);
                out.extend(context);
                out.push(*ty);
            }
            AstKind::DataDeclaration {
                simple_type,
                constructors,
                ..
            } => {
                out.push(*simple_type);
                out.extend(constructors);
            }
            AstKind::TypeClassDeclaration {
                context,
                class_var,
                declarations,
                ..
            } => {
                out.extend(context);
                out.push(*class_var);
                out.extend(declarations);
            }
            AstKind::TypeClassInstance {
                context,
                class_conid,
                inst,
                declarations,
                ..
            } => {
                out.extend(context);
                out.push(*class_conid);
                out.push(*inst);
                out.extend(declarations);
            }
            AstKind::TypeClassContext { class_conid, var } => out.extend([*class_conid, *var]),
            AstKind::Variable { initializer, .. } => out.extend(initializer),
            AstKind::ConId { .. } | AstKind::Constant { .. } | AstKind::Wildcard => {}
            AstKind::Constructor { conid, args } => {
                out.push(*conid);
                out.extend(args);
            }
            AstKind::App { function, argument } => out.extend([*function, *argument]),
            AstKind::BinOp { lhs, rhs, .. } => out.extend([*lhs, *rhs]),
            AstKind::BinOpSym { op, left, right } => out.extend([*op, *left, *right]),
            AstKind::OpLeftSection { left, .. } => out.push(*left),
            AstKind::OpRightSection { right, .. } => out.push(*right),
            AstKind::IfThenElse {
                if_expr,
                then_expr,
                else_expr,
            } => out.extend([*if_expr, *then_expr, *else_expr]),
            AstKind::Lambda { apats, expression } => {
                out.extend(apats);
                out.push(*expression);
            }
            AstKind::Let {
                declarations,
                expression,
            } => out.extend([*declarations, *expression]),
            AstKind::Case {
                expression,
                alternatives,
            } => {
                out.push(*expression);
                out.extend(alternatives);
            }
            AstKind::CaseAlternative { pat, body } => out.extend([*pat, *body]),
            AstKind::Tuple { expressions }
            | AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions }
            | AstKind::PatExpression { expressions }
            | AstKind::SeqExpression { expressions } => out.extend(expressions),
            AstKind::ArithmeticSequence { from, then, to } => {
                out.push(*from);
                out.extend(then);
                out.extend(to);
            }
            AstKind::Do { statements } => out.extend(statements),
            AstKind::BindAssignment { expression, .. } => out.push(*expression),
            AstKind::PatBindAssignment { pat, expression } => out.extend([*pat, *expression]),
            AstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => out.extend([*range_init, *value_init, *index_apat, *value_apat, *expression]),
            AstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => out.extend([*value_init, *value_apat, *while_expression, *do_expression]),
            AstKind::SimpleType {
                type_con,
                type_vars,
            } => {
                out.push(*type_con);
                out.extend(type_vars);
            }
            AstKind::TypeApp { ty, arg } => out.extend([*ty, *arg]),
            AstKind::FunctionType { arg, result } => out.extend([*arg, *result]),
            AstKind::TypeAttribute {
                attributed_type, ..
            } => out.push(*attributed_type),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SourceSpan;

    #[test]
    fn test_alloc_sets_no_annotations() {
        let mut arena = AstArena::new();
        let id = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        assert!(arena.get(id).ty.is_none());
        assert!(arena.get(id).scope.is_none());
    }

    #[test]
    fn test_create_apps_left_associates() {
        let mut arena = AstArena::new();
        let f = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        let a = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        let b = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        let app = arena.create_apps(f, &[a, b], SourceSpan::NULL);
        match arena.kind(app) {
            AstKind::App { function, argument } => {
                assert_eq!(*argument, b);
                match arena.kind(*function) {
                    AstKind::App { function, argument } => {
                        assert_eq!(*function, f);
                        assert_eq!(*argument, a);
                    }
                    other => panic!("expected inner App, got {other:?}"),
                }
            }
            other => panic!("expected App, got {other:?}"),
        }
    }

    #[test]
    fn test_children_structural_order() {
        let mut arena = AstArena::new();
        let cond = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        let then_e = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        let else_e = arena.alloc(AstKind::Wildcard, SourceSpan::NULL);
        let ite = arena.alloc(
            AstKind::IfThenElse {
                if_expr: cond,
                then_expr: then_e,
                else_expr: else_e,
            },
            SourceSpan::NULL,
        );
        assert_eq!(arena.children(ite), vec![cond, then_e, else_e]);
    }
}
