//! Core translation (phase G).
//!
//! Lowers the monomorphized AST into Core. Type signatures, class
//! declarations, and polymorphic values are dropped; polymorphic data
//! declarations are kept. Pattern arguments lower to fresh variables
//! scrutinized by cases, if/then/else to a two-alternative case on Bool,
//! sections to eta-expanded lambdas, do-notation to the resolved monad
//! instance's bind, and sequence literals to a ticked accumulator inside
//! the `Seq` constructor. Incomplete case expressions surface here as
//! non-exhaustive-pattern errors.
//!
//! Every produced node carries a deep copy of the corresponding AST type
//! and is kind-checked on creation.

use rustc_hash::FxHashMap;

use crate::base::{Interner, SourceSpan};
use crate::core::{CoreArena, CoreAstSymbol, CoreId, CoreKind, CoreLiteral, CoreSymbolId, CoreSymbolTable, LoopKind};
use crate::error::{CompileError, CompileErrorKind, Result};
use crate::syntax::ast::{AstArena, AstId, AstKind, Constant, VarKind};
use crate::syntax::symbol::{SymbolId, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::kind::kind_infer;
use crate::types::{TypeArena, TypeId, TypeTerm};

struct Translate<'a> {
    ast: &'a AstArena,
    symbols: &'a SymbolTable,
    types: &'a mut TypeArena,
    classes: &'a ClassTable,
    base: &'a BaseModule,
    interner: &'a mut Interner,
    core: &'a mut CoreArena,
    core_symbols: &'a mut CoreSymbolTable,
    sym_map: FxHashMap<SymbolId, CoreSymbolId>,
    fresh_counter: u32,
}

/// Lower the typed, monomorphized AST (plus the base data declarations)
/// into a fresh Core arena.
pub fn translate(
    ast: &AstArena,
    symbols: &SymbolTable,
    types: &mut TypeArena,
    classes: &ClassTable,
    base: &BaseModule,
    interner: &mut Interner,
    core: &mut CoreArena,
    core_symbols: &mut CoreSymbolTable,
) -> Result<()> {
    let mut t = Translate {
        ast,
        symbols,
        types,
        classes,
        base,
        interner,
        core,
        core_symbols,
        sym_map: FxHashMap::default(),
        fresh_counter: 0,
    };

    let mut top_binds: Vec<CoreId> = Vec::new();
    for &decl in &base.data_declarations {
        let lowered = t.translate_data_decl(decl)?;
        top_binds.push(lowered);
    }
    if let Some(root) = ast.root {
        t.translate_group_list(root, &mut top_binds)?;
    }

    // The root is a chain of lets terminating in None.
    let mut chain: Option<CoreId> = None;
    for &bind in top_binds.iter().rev() {
        let ty = t.core.ty(bind);
        chain = Some(t.core.create_let(bind, chain, ty));
    }
    t.core.root = chain;
    Ok(())
}

impl<'a> Translate<'a> {
    // ------------------------------------------------------------------
    // Symbols and types
    // ------------------------------------------------------------------

    fn core_symbol(&mut self, symbol: SymbolId) -> CoreSymbolId {
        if let Some(&existing) = self.sym_map.get(&symbol) {
            return existing;
        }
        let source = self.symbols.get(symbol);
        let mut core_sym = CoreAstSymbol::new(source.name.clone(), source.ty);
        core_sym.source_name = source.source_name.clone();
        core_sym.ast_symbol = Some(symbol);
        core_sym.arity = source.arity.unwrap_or(0);
        core_sym.con_num = source.con_num;
        core_sym.is_constructor = source.is_constructor;
        core_sym.is_enum = source.is_enum;
        core_sym.is_wrapper = source.is_wrapper;
        core_sym.is_primitive = source.is_primitive;
        core_sym.is_recursive = source.is_recursive;
        core_sym.state_type = source.state_type;
        let id = self.core_symbols.insert(core_sym);
        self.sym_map.insert(symbol, id);
        id
    }

    fn fresh_symbol(&mut self, prefix: &str, ty: Option<TypeId>) -> CoreSymbolId {
        self.fresh_counter += 1;
        let name = self
            .interner
            .intern(&format!("{}@{}", prefix, self.fresh_counter));
        self.core_symbols.insert(CoreAstSymbol::new(name, ty))
    }

    /// Deep-copied node type, kind-checked.
    fn copy_ty(&mut self, id: AstId) -> Result<Option<TypeId>> {
        match self.ast.ty(id) {
            Some(ty) => {
                let copied = self.types.deep_copy(ty);
                kind_infer(
                    self.types,
                    self.symbols,
                    self.base,
                    copied,
                    self.ast.span(id),
                )?;
                Ok(Some(copied))
            }
            None => Ok(None),
        }
    }

    fn prim_core_var(&mut self, symbol: SymbolId, ty: Option<TypeId>) -> CoreId {
        let core_sym = self.core_symbol(symbol);
        let ty = ty.or(self.symbols.get(symbol).ty);
        self.core.create_var(core_sym, ty)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn translate_group_list(&mut self, list: AstId, out: &mut Vec<CoreId>) -> Result<()> {
        let AstKind::DeclarationGroupList { groups } = self.ast.kind(list).clone() else {
            return Ok(());
        };
        for group in groups {
            self.translate_group(group, out)?;
        }
        Ok(())
    }

    fn translate_group(&mut self, group: AstId, out: &mut Vec<CoreId>) -> Result<()> {
        let AstKind::DeclarationGroup { declarations } = self.ast.kind(group).clone() else {
            return Ok(());
        };
        let mut group_binds = Vec::new();
        for decl in &declarations {
            match self.ast.kind(*decl).clone() {
                AstKind::DataDeclaration { .. } => {
                    let lowered = self.translate_data_decl(*decl)?;
                    out.push(lowered);
                }
                AstKind::TypeClassDeclaration { .. } | AstKind::TypeSignature { .. } => {}
                AstKind::TypeClassInstance { declarations, .. } => {
                    if let Some(declarations) = declarations {
                        self.translate_group_list(declarations, out)?;
                    }
                }
                AstKind::SimpleAssignment { symbol, .. }
                | AstKind::ApatsAssignment { symbol, .. } => {
                    // Monomorphization leaves the polymorphic originals
                    // behind; they are vestigial here.
                    let ty = self.symbols.get(symbol).ty;
                    let is_poly = ty.map(|t| self.types.is_polymorphic(t)).unwrap_or(false);
                    if is_poly {
                        continue;
                    }
                    let bind = self.translate_bind(*decl)?;
                    group_binds.push(bind);
                }
                AstKind::PatAssignment { .. } => {
                    self.translate_pat_assignment(*decl, &mut group_binds)?;
                }
                _ => {}
            }
        }
        // A multi-member surviving nest is a recursive group.
        match group_binds.len() {
            0 => {}
            1 => out.push(group_binds[0]),
            _ => {
                let ty = self.core.ty(group_binds[0]);
                let rec = self.core.alloc(
                    CoreKind::BindRec {
                        binds: group_binds,
                    },
                    ty,
                );
                out.push(rec);
            }
        }
        Ok(())
    }

    fn translate_data_decl(&mut self, decl: AstId) -> Result<CoreId> {
        let AstKind::DataDeclaration {
            symbol,
            constructors,
            ..
        } = self.ast.kind(decl).clone()
        else {
            unreachable!("data declaration expected");
        };
        let data_symbol = self.core_symbol(symbol);
        let mut cons = Vec::with_capacity(constructors.len());
        for con_node in constructors {
            let AstKind::Constructor { conid, .. } = self.ast.kind(con_node).clone() else {
                continue;
            };
            let AstKind::ConId { symbol: con_ast_symbol, .. } = self.ast.kind(conid).clone()
            else {
                continue;
            };
            let con_symbol = self.core_symbol(con_ast_symbol);
            let con_ty = self
                .symbols
                .get(con_ast_symbol)
                .ty
                .expect("constructor typed");
            let data_type_ty = {
                let stripped = self.types.strip_for_all(con_ty);
                self.types.fully_applied_result(stripped)
            };
            let node = self.core.create_data_con(con_symbol, con_ty, data_type_ty);
            self.core_symbols.get_mut(con_symbol).ast = Some(node);
            cons.push(node);
        }
        let decl_ty = self.symbols.get(symbol).ty;
        let node = self.core.create_data_decl(data_symbol, cons, decl_ty);
        self.core_symbols.get_mut(data_symbol).ast = Some(node);
        Ok(node)
    }

    fn translate_bind(&mut self, decl: AstId) -> Result<CoreId> {
        match self.ast.kind(decl).clone() {
            AstKind::SimpleAssignment {
                symbol,
                initializer,
                rhs,
                is_recursive,
            } => {
                let core_sym = self.core_symbol(symbol);
                let expr = self.translate_expr(rhs)?;
                let initializer = match initializer {
                    Some(init) => Some(self.translate_expr(init)?),
                    None => None,
                };
                let ty = self.copy_ty(decl)?;
                let bind = self.core.create_bind(core_sym, expr, initializer, ty);
                {
                    let sym = self.core_symbols.get_mut(core_sym);
                    sym.ast = Some(bind);
                    sym.is_recursive = sym.is_recursive || is_recursive;
                }
                let arity = self.core.num_args(bind);
                self.core_symbols.get_mut(core_sym).arity = arity;
                Ok(bind)
            }

            AstKind::ApatsAssignment {
                symbol,
                apats,
                rhs,
                is_recursive,
            } => {
                let core_sym = self.core_symbol(symbol);
                let mut body = self.translate_expr(rhs)?;
                for &apat in apats.iter().rev() {
                    body = self.lam_for_pattern(apat, body)?;
                }
                let ty = self.copy_ty(decl)?;
                let bind = self.core.create_bind(core_sym, body, None, ty);
                {
                    let sym = self.core_symbols.get_mut(core_sym);
                    sym.ast = Some(bind);
                    sym.is_recursive = sym.is_recursive || is_recursive;
                }
                let arity = self.core.num_args(bind);
                self.core_symbols.get_mut(core_sym).arity = arity;
                Ok(bind)
            }

            _ => unreachable!("value binding expected"),
        }
    }

    /// `pat = rhs` lowers to a fresh bind of the right-hand side plus one
    /// extraction bind per pattern variable, each a single-alternative
    /// case.
    fn translate_pat_assignment(&mut self, decl: AstId, out: &mut Vec<CoreId>) -> Result<()> {
        let AstKind::PatAssignment { pat, rhs } = self.ast.kind(decl).clone() else {
            return Ok(());
        };
        let rhs_core = self.translate_expr(rhs)?;
        let rhs_ty = self.copy_ty(rhs)?;
        let scrutinee_sym = self.fresh_symbol("pat", rhs_ty);
        let scrutinee_bind = self
            .core
            .create_bind(scrutinee_sym, rhs_core, None, rhs_ty);
        self.core_symbols.get_mut(scrutinee_sym).ast = Some(scrutinee_bind);
        out.push(scrutinee_bind);

        let mut vars = Vec::new();
        self.pattern_vars(pat, &mut vars);
        for var_symbol in vars {
            let core_var_sym = self.core_symbol(var_symbol);
            let var_ty = self.symbols.get(var_symbol).ty;
            let scrutinee_var = self.core.create_var(scrutinee_sym, rhs_ty);
            let pat_core = self.translate_pattern(pat)?;
            let body = self.core.create_var(core_var_sym, var_ty);
            let alt = self.core.create_case_alt(Some(pat_core), body, var_ty);
            let case = self.core.create_case(scrutinee_var, vec![alt], var_ty);
            let bind = self.core.create_bind(core_var_sym, case, None, var_ty);
            self.core_symbols.get_mut(core_var_sym).ast = Some(bind);
            out.push(bind);
        }
        Ok(())
    }

    fn pattern_vars(&self, pat: AstId, out: &mut Vec<SymbolId>) {
        if let AstKind::Variable {
            symbol,
            var_kind: VarKind::Declaration,
            ..
        } = self.ast.kind(pat)
        {
            out.push(*symbol);
        }
        for child in self.ast.children(pat) {
            self.pattern_vars(child, out);
        }
    }

    /// One lambda layer for a formal pattern: a variable binds directly,
    /// anything else binds a fresh variable scrutinized by a case.
    fn lam_for_pattern(&mut self, apat: AstId, body: CoreId) -> Result<CoreId> {
        let pat_ty = self.copy_ty(apat)?;
        let body_ty = self.core.ty(body);
        let lam_ty = match (pat_ty, body_ty) {
            (Some(p), Some(b)) => Some(self.types.mk_fun(p, b)),
            _ => None,
        };
        match self.ast.kind(apat).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                ..
            } => {
                let core_sym = self.core_symbol(symbol);
                let arg = self.core.create_var(core_sym, pat_ty);
                Ok(self.core.create_lam(arg, body, lam_ty))
            }
            AstKind::Wildcard => {
                let fresh = self.fresh_symbol("x", pat_ty);
                let arg = self.core.create_var(fresh, pat_ty);
                Ok(self.core.create_lam(arg, body, lam_ty))
            }
            _ => {
                let fresh = self.fresh_symbol("x", pat_ty);
                let arg = self.core.create_var(fresh, pat_ty);
                let scrutinee = self.core.create_var(fresh, pat_ty);
                let pat_core = self.translate_pattern(apat)?;
                self.check_exhaustive(apat, &[apat])?;
                let alt = self.core.create_case_alt(Some(pat_core), body, body_ty);
                let case = self.core.create_case(scrutinee, vec![alt], body_ty);
                Ok(self.core.create_lam(arg, case, lam_ty))
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn translate_expr(&mut self, id: AstId) -> Result<CoreId> {
        let ty = self.copy_ty(id)?;
        match self.ast.kind(id).clone() {
            AstKind::Variable { symbol, .. } => {
                let core_sym = self.core_symbol(symbol);
                Ok(self.core.create_var(core_sym, ty))
            }

            AstKind::ConId { symbol, .. } => {
                let core_sym = self.core_symbol(symbol);
                Ok(self.core.create_var(core_sym, ty))
            }

            AstKind::Constant { value } => {
                let value = match value {
                    Constant::Integer(v) => CoreLiteral::Int(v),
                    Constant::Float(v) => CoreLiteral::Float(v),
                    Constant::UInt(v) => CoreLiteral::UInt(v),
                    Constant::Char(v) => CoreLiteral::Char(v),
                    Constant::String(v) => CoreLiteral::String(v),
                };
                Ok(self.core.create_lit(value, ty))
            }

            AstKind::App { function, argument } => {
                let function = self.translate_expr(function)?;
                let argument = self.translate_expr(argument)?;
                Ok(self.core.create_app(function, argument, ty))
            }

            AstKind::BinOp { symbol, lhs, rhs, .. } => {
                let op = self.prim_core_var(symbol, None);
                let lhs = self.translate_expr(lhs)?;
                let rhs = self.translate_expr(rhs)?;
                let partial = self.core.create_app(op, lhs, None);
                Ok(self.core.create_app(partial, rhs, ty))
            }

            AstKind::OpLeftSection { symbol, left, .. } => {
                // (e op) ==> \x -> e op x
                let op = self.prim_core_var(symbol, None);
                let left = self.translate_expr(left)?;
                let arg_ty = ty.and_then(|t| {
                    let t = self.types.find(t);
                    match self.types.term(t) {
                        TypeTerm::Fun { arg, .. } => Some(*arg),
                        _ => None,
                    }
                });
                let x = self.fresh_symbol("x", arg_ty);
                let x_var = self.core.create_var(x, arg_ty);
                let x_use = self.core.create_var(x, arg_ty);
                let partial = self.core.create_app(op, left, None);
                let applied = self.core.create_app(partial, x_use, None);
                Ok(self.core.create_lam(x_var, applied, ty))
            }

            AstKind::OpRightSection { symbol, right, .. } => {
                // (op e) ==> \x -> x op e
                let op = self.prim_core_var(symbol, None);
                let right = self.translate_expr(right)?;
                let arg_ty = ty.and_then(|t| {
                    let t = self.types.find(t);
                    match self.types.term(t) {
                        TypeTerm::Fun { arg, .. } => Some(*arg),
                        _ => None,
                    }
                });
                let x = self.fresh_symbol("x", arg_ty);
                let x_var = self.core.create_var(x, arg_ty);
                let x_use = self.core.create_var(x, arg_ty);
                let partial = self.core.create_app(op, x_use, None);
                let applied = self.core.create_app(partial, right, None);
                Ok(self.core.create_lam(x_var, applied, ty))
            }

            AstKind::IfThenElse {
                if_expr,
                then_expr,
                else_expr,
            } => {
                let scrutinee = self.translate_expr(if_expr)?;
                let then_core = self.translate_expr(then_expr)?;
                let else_core = self.translate_expr(else_expr)?;
                let true_sym = self.core_symbol(self.base.true_con);
                let bool_ty = self.symbols.get(self.base.bool_type).ty;
                let true_pat = self.core.create_var(true_sym, bool_ty);
                let then_alt = self.core.create_case_alt(Some(true_pat), then_core, ty);
                let else_alt = self.core.create_case_alt(None, else_core, ty);
                Ok(self.core.create_case(scrutinee, vec![then_alt, else_alt], ty))
            }

            AstKind::Lambda { apats, expression } => {
                let mut body = self.translate_expr(expression)?;
                for &apat in apats.iter().rev() {
                    body = self.lam_for_pattern(apat, body)?;
                }
                if let Some(ty) = ty {
                    self.core.set_ty(body, ty);
                }
                Ok(body)
            }

            AstKind::Let {
                declarations,
                expression,
            } => {
                let mut binds = Vec::new();
                self.translate_group_list(declarations, &mut binds)?;
                let mut result = self.translate_expr(expression)?;
                for &bind in binds.iter().rev() {
                    result = self.core.create_let(bind, Some(result), ty);
                }
                Ok(result)
            }

            AstKind::Rhs {
                expression,
                declarations,
            } => {
                let mut binds = Vec::new();
                if let Some(declarations) = declarations {
                    self.translate_group_list(declarations, &mut binds)?;
                }
                let mut result = self.translate_expr(expression)?;
                for &bind in binds.iter().rev() {
                    result = self.core.create_let(bind, Some(result), ty);
                }
                Ok(result)
            }

            AstKind::Case {
                expression,
                alternatives,
            } => {
                let scrutinee = self.translate_expr(expression)?;
                let pats: Vec<AstId> = alternatives
                    .iter()
                    .filter_map(|&alt| match self.ast.kind(alt) {
                        AstKind::CaseAlternative { pat, .. } => Some(*pat),
                        _ => None,
                    })
                    .collect();
                self.check_exhaustive(expression, &pats)?;
                let mut alts = Vec::with_capacity(alternatives.len());
                for alt in alternatives {
                    let AstKind::CaseAlternative { pat, body } = self.ast.kind(alt).clone()
                    else {
                        continue;
                    };
                    let body_core = self.translate_expr(body)?;
                    let pat_core = match self.ast.kind(pat) {
                        AstKind::Wildcard => None,
                        _ => Some(self.translate_pattern(pat)?),
                    };
                    alts.push(self.core.create_case_alt(pat_core, body_core, ty));
                }
                Ok(self.core.create_case(scrutinee, alts, ty))
            }

            AstKind::Tuple { expressions } => {
                let con_symbol = self
                    .base
                    .tuple_con(expressions.len())
                    .expect("tuple arity within 2..=10");
                let con = self.prim_core_var(con_symbol, None);
                let mut acc = con;
                for expr in expressions {
                    let arg = self.translate_expr(expr)?;
                    acc = self.core.create_app(acc, arg, None);
                }
                if let Some(ty) = ty {
                    self.core.set_ty(acc, ty);
                }
                Ok(acc)
            }

            AstKind::ExpressionList { expressions } | AstKind::ExpressionArray { expressions } => {
                let elements = expressions
                    .iter()
                    .map(|&e| self.translate_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.core.create_lit(CoreLiteral::Array(elements), ty))
            }

            AstKind::SeqExpression { expressions } => {
                self.translate_sequence(id, &expressions, self.base.seq_tick, ty, false)
            }

            AstKind::PatExpression { expressions } => {
                self.translate_sequence(id, &expressions, self.base.interleave_tick, ty, true)
            }

            AstKind::ArithmeticSequence { from, then, to } => {
                // Lowered like a sequence literal over its written points.
                let mut expressions = vec![from];
                expressions.extend(then);
                expressions.extend(to);
                self.translate_sequence(id, &expressions, self.base.seq_tick, ty, false)
            }

            AstKind::Do { statements } => self.translate_do(id, &statements, ty),

            AstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => {
                let range_core = self.translate_expr(range_init)?;
                let value_core = self.translate_expr(value_init)?;
                let index_pat = self.loop_pattern(index_apat)?;
                let value_pat = self.loop_pattern(value_apat)?;
                let body = self.translate_expr(expression)?;
                let max_loops = self.nat_head_of(range_init);
                Ok(self.core.alloc(
                    CoreKind::Loop {
                        loop_kind: LoopKind::For {
                            index_pat,
                            range_init: range_core,
                            max_loops,
                        },
                        value_pat,
                        value_init: value_core,
                        body,
                    },
                    ty,
                ))
            }

            AstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => {
                let value_core = self.translate_expr(value_init)?;
                let value_pat = self.loop_pattern(value_apat)?;
                let condition = self.translate_expr(while_expression)?;
                let body = self.translate_expr(do_expression)?;
                Ok(self.core.alloc(
                    CoreKind::Loop {
                        loop_kind: LoopKind::While { condition },
                        value_pat,
                        value_init: value_core,
                        body,
                    },
                    ty,
                ))
            }

            AstKind::Constructor { conid, args } => {
                let con = self.translate_expr(conid)?;
                let mut acc = con;
                for arg in args {
                    let arg_core = self.translate_expr(arg)?;
                    acc = self.core.create_app(acc, arg_core, None);
                }
                if let Some(ty) = ty {
                    self.core.set_ty(acc, ty);
                }
                Ok(acc)
            }

            AstKind::Wildcard => {
                // `_primUndefined` stands in for unreachable expressions.
                Ok(self.prim_core_var(self.base.prim_undefined, ty))
            }

            other => unreachable!("non-expression node in expression position: {other:?}"),
        }
    }

    /// First `Nat` argument of the expression's type constructor.
    fn nat_head_of(&self, id: AstId) -> u64 {
        let Some(ty) = self.ast.ty(id) else { return 0 };
        let ty = self.types.find_const(ty);
        if let TypeTerm::Con { args, .. } = self.types.term(ty) {
            for &arg in args {
                if let TypeTerm::Nat(n) = self.types.term(self.types.find_const(arg)) {
                    return *n;
                }
            }
        }
        0
    }

    fn loop_pattern(&mut self, apat: AstId) -> Result<CoreId> {
        let ty = self.copy_ty(apat)?;
        match self.ast.kind(apat).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                ..
            } => {
                let core_sym = self.core_symbol(symbol);
                Ok(self.core.create_var(core_sym, ty))
            }
            _ => {
                let fresh = self.fresh_symbol("i", ty);
                Ok(self.core.create_var(fresh, ty))
            }
        }
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn translate_pattern(&mut self, pat: AstId) -> Result<CoreId> {
        let ty = self.copy_ty(pat)?;
        match self.ast.kind(pat).clone() {
            AstKind::Variable { symbol, .. } => {
                let core_sym = self.core_symbol(symbol);
                Ok(self.core.create_var(core_sym, ty))
            }
            AstKind::Wildcard => {
                let fresh = self.fresh_symbol("wild", ty);
                Ok(self.core.create_var(fresh, ty))
            }
            AstKind::Constant { value } => {
                let value = match value {
                    Constant::Integer(v) => CoreLiteral::Int(v),
                    Constant::Float(v) => CoreLiteral::Float(v),
                    Constant::UInt(v) => CoreLiteral::UInt(v),
                    Constant::Char(v) => CoreLiteral::Char(v),
                    Constant::String(v) => CoreLiteral::String(v),
                };
                Ok(self.core.create_lit(value, ty))
            }
            AstKind::ConId { symbol, .. } => {
                let core_sym = self.core_symbol(symbol);
                Ok(self.core.create_var(core_sym, ty))
            }
            AstKind::Constructor { conid, args } => {
                let con = self.translate_pattern(conid)?;
                let mut acc = con;
                for arg in args {
                    let arg_core = self.translate_pattern(arg)?;
                    acc = self.core.create_app(acc, arg_core, None);
                }
                if let Some(ty) = ty {
                    self.core.set_ty(acc, ty);
                }
                Ok(acc)
            }
            AstKind::Tuple { expressions } => {
                let con_symbol = self
                    .base
                    .tuple_con(expressions.len())
                    .expect("tuple arity within 2..=10");
                let con = self.prim_core_var(con_symbol, None);
                let mut acc = con;
                for expr in expressions {
                    let arg = self.translate_pattern(expr)?;
                    acc = self.core.create_app(acc, arg, None);
                }
                if let Some(ty) = ty {
                    self.core.set_ty(acc, ty);
                }
                Ok(acc)
            }
            AstKind::BinOpSym { op, left, right } => {
                let op_core = self.translate_pattern(op)?;
                let left_core = self.translate_pattern(left)?;
                let right_core = self.translate_pattern(right)?;
                let partial = self.core.create_app(op_core, left_core, None);
                Ok(self.core.create_app(partial, right_core, ty))
            }
            AstKind::App { function, argument } => {
                let function = self.translate_pattern(function)?;
                let argument = self.translate_pattern(argument)?;
                Ok(self.core.create_app(function, argument, ty))
            }
            other => unreachable!("non-pattern node in pattern position: {other:?}"),
        }
    }

    /// Alternatives must cover the scrutinee's type: a variable or
    /// wildcard anywhere, or every constructor of the data type.
    fn check_exhaustive(&mut self, scrutinee: AstId, pats: &[AstId]) -> Result<()> {
        let catch_all = pats.iter().any(|&pat| {
            matches!(
                self.ast.kind(pat),
                AstKind::Wildcard
                    | AstKind::Variable {
                        var_kind: VarKind::Declaration,
                        ..
                    }
            )
        });
        if catch_all {
            return Ok(());
        }
        let Some(ty) = self.ast.ty(scrutinee) else {
            return Ok(());
        };
        let ty = self.types.find_const(self.types.strip_for_all(ty));
        let con_symbol = match self.types.term(ty) {
            TypeTerm::Con { symbol, .. } => *symbol,
            _ => {
                return Err(self.non_exhaustive(scrutinee));
            }
        };

        // Tuples have a single constructor; a tuple pattern covers them.
        if self.base.tuple_types.contains(&con_symbol) {
            return Ok(());
        }

        // All constructors of the declared data type must appear.
        let Some(decl) = self.symbols.get(con_symbol).ast else {
            // Primitive scrutinee (Int, Float, ...) with only literal
            // alternatives can never be exhaustive.
            return Err(self.non_exhaustive(scrutinee));
        };
        let AstKind::DataDeclaration { constructors, .. } = self.ast.kind(decl).clone() else {
            return Err(self.non_exhaustive(scrutinee));
        };
        let mut covered: Vec<SymbolId> = Vec::new();
        for &pat in pats {
            if let Some(symbol) = self.pattern_head_con(pat) {
                if !covered.contains(&symbol) {
                    covered.push(symbol);
                }
            }
        }
        if covered.len() == constructors.len() {
            Ok(())
        } else {
            Err(self.non_exhaustive(scrutinee))
        }
    }

    fn pattern_head_con(&self, pat: AstId) -> Option<SymbolId> {
        match self.ast.kind(pat) {
            AstKind::ConId { symbol, .. } => Some(*symbol),
            AstKind::Constructor { conid, .. } => self.pattern_head_con(*conid),
            AstKind::App { function, .. } => self.pattern_head_con(*function),
            AstKind::BinOpSym { op, .. } => self.pattern_head_con(*op),
            _ => None,
        }
    }

    fn non_exhaustive(&self, scrutinee: AstId) -> CompileError {
        let ty_str = self
            .ast
            .ty(scrutinee)
            .map(|ty| self.types.display(ty, self.symbols))
            .unwrap_or_else(|| "_".to_string());
        CompileError::new(
            CompileErrorKind::NonExhaustivePatterns { ty: ty_str },
            self.ast.span(scrutinee),
        )
    }

    // ------------------------------------------------------------------
    // Sequence desugaring
    // ------------------------------------------------------------------

    /// `seq [e0, .., eN]` lowers to a let binding the ticked accumulator
    /// of type `(Index, SeqValue a)`, with the literals as alternatives of
    /// an inner case keyed on the current index, wrapped in the `Seq`
    /// constructor. Pattern sequences additionally run through `runSeq`.
    fn translate_sequence(
        &mut self,
        _id: AstId,
        expressions: &[AstId],
        tick: SymbolId,
        ty: Option<TypeId>,
        as_pattern: bool,
    ) -> Result<CoreId> {
        // Element type from the sequence's own type.
        let elem_ty = ty.and_then(|t| {
            let t = self.types.find_const(t);
            match self.types.term(t) {
                TypeTerm::Con { args, .. } => args.first().copied(),
                _ => None,
            }
        });

        // (Index, SeqValue a)
        let acc_ty = elem_ty.map(|elem| {
            let index_ty = self.symbols.get(self.base.index_type).ty.expect("typed");
            let seq_value = self.types.mk_con(self.base.seq_value_type, vec![elem]);
            self.types.get_mut(seq_value).kind_of = Some(self.base.star_kind_ty);
            let acc = self
                .types
                .mk_con(self.base.tuple_types[0], vec![index_ty, seq_value]);
            self.types.get_mut(acc).kind_of = Some(self.base.star_kind_ty);
            acc
        });

        let acc_sym = self.fresh_symbol("acc", acc_ty);
        let ticked_sym = self.fresh_symbol("acc", acc_ty);
        let index_sym = {
            let index_ty = self.symbols.get(self.base.index_type).ty;
            self.fresh_symbol("i", index_ty)
        };
        let sv_sym = self.fresh_symbol("sv", None);

        // let acc' = tick acc in ...
        let tick_var = self.prim_core_var(tick, None);
        let acc_var = self.core.create_var(acc_sym, acc_ty);
        let ticked = self.core.create_app(tick_var, acc_var, acc_ty);
        let ticked_bind = self.core.create_bind(ticked_sym, ticked, None, acc_ty);

        // case acc' of (i, sv) -> case i of 0 -> e0; ...; _ -> eN
        let mut alts = Vec::with_capacity(expressions.len());
        for (index, &expr) in expressions.iter().enumerate() {
            let body = self.translate_expr(expr)?;
            let pat = if index + 1 == expressions.len() {
                None
            } else {
                let index_ty = self.symbols.get(self.base.index_type).ty;
                Some(
                    self.core
                        .create_lit(CoreLiteral::UInt(index as u64), index_ty),
                )
            };
            alts.push(self.core.create_case_alt(pat, body, elem_ty));
        }
        let index_var = self.core.create_var(index_sym, None);
        let inner_case = self.core.create_case(index_var, alts, elem_ty);

        let tuple_con = self.prim_core_var(self.base.tuple_cons[0], None);
        let index_pat_var = self.core.create_var(index_sym, None);
        let sv_pat_var = self.core.create_var(sv_sym, None);
        let partial = self.core.create_app(tuple_con, index_pat_var, None);
        let tuple_pat = self.core.create_app(partial, sv_pat_var, acc_ty);
        let unpack_alt = self.core.create_case_alt(Some(tuple_pat), inner_case, elem_ty);
        let ticked_var = self.core.create_var(ticked_sym, acc_ty);
        let unpack_case = self
            .core
            .create_case(ticked_var, vec![unpack_alt], elem_ty);

        let let_ticked = self
            .core
            .create_let(ticked_bind, Some(unpack_case), elem_ty);

        // Seq (\acc -> ...)
        let acc_param = self.core.create_var(acc_sym, acc_ty);
        let step_ty = match (acc_ty, elem_ty) {
            (Some(acc), Some(elem)) => Some(self.types.mk_fun(acc, elem)),
            _ => None,
        };
        let step_lam = self.core.create_lam(acc_param, let_ticked, step_ty);
        let seq_con = self.prim_core_var(self.base.seq_con, None);
        let seq_value = self.core.create_app(seq_con, step_lam, ty);

        if as_pattern {
            let run = self.prim_core_var(self.base.run_seq, None);
            Ok(self.core.create_app(run, seq_value, ty))
        } else {
            Ok(seq_value)
        }
    }

    // ------------------------------------------------------------------
    // Do notation
    // ------------------------------------------------------------------

    /// Desugar do-notation through the bind/then implementations of the
    /// statement monad's instance (resolved from the ground statement
    /// types monomorphization produced).
    fn translate_do(&mut self, id: AstId, statements: &[AstId], ty: Option<TypeId>) -> Result<CoreId> {
        let span = self.ast.span(id);
        let Some((&last, init)) = statements.split_last() else {
            return Ok(self.prim_core_var(self.base.prim_undefined, ty));
        };
        let last_expr = match self.ast.kind(last).clone() {
            AstKind::BindAssignment { expression, .. }
            | AstKind::PatBindAssignment { expression, .. } => expression,
            _ => last,
        };
        let mut result = self.translate_expr(last_expr)?;

        for &statement in init.iter().rev() {
            let (bind_impl, then_impl) = self.monad_impls_for(statement, span)?;
            match self.ast.kind(statement).clone() {
                AstKind::BindAssignment { symbol, expression } => {
                    let expr_core = self.translate_expr(expression)?;
                    let elem_ty = self.symbols.get(symbol).ty;
                    let core_sym = self.core_symbol(symbol);
                    let arg = self.core.create_var(core_sym, elem_ty);
                    let cont = self.core.create_lam(arg, result, None);
                    let bind_var = self.prim_core_var(bind_impl, None);
                    let partial = self.core.create_app(bind_var, expr_core, None);
                    result = self.core.create_app(partial, cont, ty);
                }
                AstKind::PatBindAssignment { pat, expression } => {
                    let expr_core = self.translate_expr(expression)?;
                    let cont = self.lam_for_pattern(pat, result)?;
                    let bind_var = self.prim_core_var(bind_impl, None);
                    let partial = self.core.create_app(bind_var, expr_core, None);
                    result = self.core.create_app(partial, cont, ty);
                }
                _ => {
                    let expr_core = self.translate_expr(statement)?;
                    let then_var = self.prim_core_var(then_impl, None);
                    let partial = self.core.create_app(then_var, expr_core, None);
                    result = self.core.create_app(partial, result, ty);
                }
            }
        }
        Ok(result)
    }

    /// The bind/then implementations for a statement's (ground) monad.
    fn monad_impls_for(&mut self, statement: AstId, span: SourceSpan) -> Result<(SymbolId, SymbolId)> {
        let stmt_ty = self.ast.ty(statement).ok_or_else(|| {
            CompileError::new(
                CompileErrorKind::AmbiguousTypeVariable {
                    var: "m".to_string(),
                    ty: "do statement".to_string(),
                },
                span,
            )
        })?;
        let stmt_ty = self.types.uncurry_app(stmt_ty);
        let head = match self.types.term(self.types.find_const(stmt_ty)) {
            TypeTerm::Con { symbol, .. } => *symbol,
            _ => {
                return Err(CompileError::new(
                    CompileErrorKind::AmbiguousTypeVariable {
                        var: "m".to_string(),
                        ty: self.types.display(stmt_ty, self.symbols),
                    },
                    span,
                ));
            }
        };
        let missing = |this: &Self| {
            CompileError::new(
                CompileErrorKind::MissingInstance {
                    class: "Monad".to_string(),
                    ty: this.symbols.source_name(head).as_str().to_string(),
                },
                span,
            )
        };
        let instance_id = self
            .classes
            .find_instance(self.base.monad_class, head)
            .ok_or_else(|| missing(self))?;
        let instance = self.classes.instance(instance_id);
        let bind_impl = instance
            .method_binding(self.base.bind_method)
            .ok_or_else(|| missing(self))?;
        let then_impl = instance
            .method_binding(self.base.then_method)
            .ok_or_else(|| missing(self))?;
        Ok((bind_impl, then_impl))
    }
}
