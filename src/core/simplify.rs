//! Core pre-simplifier (phase H).
//!
//! A fixed-point rewrite over the Core tree:
//!
//! - single-constructor single-field data types disappear, both in terms
//!   (constructor application becomes its argument, case scrutiny becomes
//!   a let) and in types;
//! - `id` applications vanish;
//! - forward/back pipe applications collapse to direct application;
//! - a lambda applied to an argument becomes a let;
//! - a single-alternative case over a variable pattern becomes a let.
//!
//! Rewriting continues until no rule fires for a node, so running the pass
//! twice is the identity.

use crate::base::Interner;
use crate::core::{CoreArena, CoreAstSymbol, CoreId, CoreKind, CoreSymbolId, CoreSymbolTable, LoopKind};
use crate::error::Result;
use crate::syntax::ast::AstKind;
use crate::syntax::ast::AstArena;
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::SymbolTable;
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::unify::TypeEnv;
use crate::types::{TypeArena, TypeId, TypeTerm};

pub struct PreSimplify<'a> {
    pub core: &'a mut CoreArena,
    pub core_symbols: &'a mut CoreSymbolTable,
    pub ast: &'a AstArena,
    pub types: &'a mut TypeArena,
    pub symbols: &'a mut SymbolTable,
    pub scopes: &'a ScopeTable,
    pub classes: &'a ClassTable,
    pub base: &'a BaseModule,
    pub interner: &'a mut Interner,
    fresh_counter: u32,
}

/// Run the pre-simplifier to its fixed point.
#[allow(clippy::too_many_arguments)]
pub fn pre_simplify(
    core: &mut CoreArena,
    core_symbols: &mut CoreSymbolTable,
    ast: &AstArena,
    types: &mut TypeArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
    classes: &ClassTable,
    base: &BaseModule,
    interner: &mut Interner,
) -> Result<()> {
    let Some(root) = core.root else {
        return Ok(());
    };
    let mut pass = PreSimplify {
        core,
        core_symbols,
        ast,
        types,
        symbols,
        scopes,
        classes,
        base,
        interner,
        fresh_counter: 0,
    };
    let new_root = pass.go(root)?;
    pass.core.root = Some(new_root);
    Ok(())
}

impl<'a> PreSimplify<'a> {
    fn env(&mut self) -> TypeEnv<'_> {
        TypeEnv {
            types: &mut *self.types,
            symbols: &mut *self.symbols,
            scopes: self.scopes,
            classes: self.classes,
            base: self.base,
            interner: &mut *self.interner,
        }
    }

    fn fresh_renamed(&mut self, original: CoreSymbolId) -> CoreSymbolId {
        self.fresh_counter += 1;
        let base_name = self.core_symbols.get(original).name.clone();
        let name = self
            .interner
            .intern(&format!("{}@{}", base_name.as_str(), self.fresh_counter));
        let ty = self.core_symbols.get(original).ty;
        let mut fresh = CoreAstSymbol::new(name, ty);
        fresh.source_name = base_name;
        self.core_symbols.insert(fresh)
    }

    fn is_wrapper_con(&self, symbol: CoreSymbolId) -> bool {
        let sym = self.core_symbols.get(symbol);
        sym.is_constructor && sym.is_wrapper
    }

    fn is_base_fn(&self, symbol: CoreSymbolId, target: crate::syntax::symbol::SymbolId) -> bool {
        self.core_symbols.get(symbol).ast_symbol == Some(target)
    }

    /// Keeps simplifying one node until no rule fires.
    fn go(&mut self, id: CoreId) -> Result<CoreId> {
        let mut current = id;
        loop {
            self.inline_wrapper_node_ty(current)?;
            let next = match self.core.kind(current).clone() {
                CoreKind::Var { .. } => self.simplify_var(current)?,
                CoreKind::Lit { .. } => self.simplify_lit(current)?,
                CoreKind::Let { .. } => self.simplify_let(current)?,
                CoreKind::Lam { .. } => self.simplify_lam(current)?,
                CoreKind::App { .. } => self.simplify_app(current)?,
                CoreKind::Case { .. } => self.simplify_case(current)?,
                CoreKind::Bind { .. } => self.simplify_bind(current)?,
                CoreKind::BindRec { .. } => self.simplify_bind_rec(current)?,
                CoreKind::Loop { .. } => self.simplify_loop(current)?,
                CoreKind::DataDecl { .. } => self.simplify_data_decl(current)?,
                CoreKind::DataCon { .. } | CoreKind::CaseAlt { .. } => current,
            };
            if next == current {
                return Ok(current);
            }
            current = next;
        }
    }

    // ------------------------------------------------------------------
    // Wrapper types
    // ------------------------------------------------------------------

    fn inline_wrapper_node_ty(&mut self, id: CoreId) -> Result<()> {
        if let Some(ty) = self.core.ty(id) {
            let inlined = self.inline_wrapper_ty(ty)?;
            if inlined != ty {
                self.core.set_ty(id, inlined);
            }
        }
        Ok(())
    }

    /// Rewrite a type so no wrapper data type remains in it: `W a` becomes
    /// the wrapped argument type at `a`.
    fn inline_wrapper_ty(&mut self, ty: TypeId) -> Result<TypeId> {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Var(_) | TypeTerm::Nat(_) | TypeTerm::Sym(_) => Ok(ty),
            TypeTerm::Con { symbol, args } => {
                let sym = self.symbols.get(symbol);
                if sym.is_wrapper && !sym.is_primitive {
                    if let Some(field) = self.wrapper_field_ty(symbol, ty)? {
                        return self.inline_wrapper_ty(field);
                    }
                }
                let mut changed = false;
                let mut new_args = Vec::with_capacity(args.len());
                for &arg in &args {
                    let inlined = self.inline_wrapper_ty(arg)?;
                    changed |= inlined != arg;
                    new_args.push(inlined);
                }
                if !changed {
                    return Ok(ty);
                }
                let new_ty = self.types.mk_con(symbol, new_args);
                self.copy_ty_annotations(ty, new_ty);
                Ok(new_ty)
            }
            TypeTerm::Fun { arg, result } => {
                let new_arg = self.inline_wrapper_ty(arg)?;
                let new_result = self.inline_wrapper_ty(result)?;
                if new_arg == arg && new_result == result {
                    return Ok(ty);
                }
                let new_ty = self.types.mk_fun(new_arg, new_result);
                self.copy_ty_annotations(ty, new_ty);
                Ok(new_ty)
            }
            TypeTerm::App { left, right } => {
                let new_left = self.inline_wrapper_ty(left)?;
                let new_right = self.inline_wrapper_ty(right)?;
                if new_left == left && new_right == right {
                    return Ok(ty);
                }
                let new_ty = self.types.mk_app(new_left, new_right);
                self.copy_ty_annotations(ty, new_ty);
                Ok(new_ty)
            }
            TypeTerm::For { var, context, body } => {
                let new_body = self.inline_wrapper_ty(body)?;
                if new_body == body {
                    return Ok(ty);
                }
                Ok(self.types.mk_for_all(var, context, new_body))
            }
        }
    }

    fn copy_ty_annotations(&mut self, from: TypeId, to: TypeId) {
        let kind_of = self.types.get(from).kind_of;
        let ownership = self.types.get(from).ownership;
        let target = self.types.get_mut(to);
        target.kind_of = kind_of;
        target.ownership = ownership;
    }

    /// The wrapped field type of `W args`: instantiate the single
    /// constructor's type and unify its result with the applied type.
    fn wrapper_field_ty(
        &mut self,
        symbol: crate::syntax::symbol::SymbolId,
        applied: TypeId,
    ) -> Result<Option<TypeId>> {
        let Some(decl) = self.symbols.get(symbol).ast else {
            return Ok(None);
        };
        let AstKind::DataDeclaration { constructors, .. } = self.ast.kind(decl).clone() else {
            return Ok(None);
        };
        let Some(&con_node) = constructors.first() else {
            return Ok(None);
        };
        let AstKind::Constructor { conid, .. } = self.ast.kind(con_node).clone() else {
            return Ok(None);
        };
        let AstKind::ConId { symbol: con_symbol, .. } = self.ast.kind(conid).clone() else {
            return Ok(None);
        };
        let Some(con_ty) = self.symbols.get(con_symbol).ty else {
            return Ok(None);
        };
        let (inst, _) = self.env().instantiate(con_ty, None);
        let field = self.env().fresh_star_var(None);
        let expected = self.types.mk_fun(field, applied);
        self.env()
            .unify(inst, expected, None, crate::base::SourceSpan::NULL)?;
        let resolved = self.types.find(field);
        let copied = self.types.deep_copy(resolved);
        Ok(Some(copied))
    }

    // ------------------------------------------------------------------
    // Per-node rules
    // ------------------------------------------------------------------

    fn simplify_var(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::Var { symbol } = self.core.kind(id).clone() else {
            return Ok(id);
        };
        if let Some(inline_ast) = self.core_symbols.get(symbol).inline_ast {
            let copied = self.core.deep_copy(inline_ast);
            return Ok(copied);
        }
        if self.is_wrapper_con(symbol) {
            // Replace a bare wrapper constructor with an identity lambda.
            let unwrapped = match self.core.ty(id) {
                Some(ty) => Some(self.inline_wrapper_ty(ty)?),
                None => None,
            };
            let arg_ty = unwrapped.and_then(|ty| {
                let ty = self.types.find(ty);
                match self.types.term(ty) {
                    TypeTerm::Fun { arg, .. } => Some(*arg),
                    _ => None,
                }
            });
            let fresh = self.fresh_renamed(symbol);
            self.core_symbols.get_mut(fresh).ty = arg_ty;
            let arg = self.core.create_var(fresh, arg_ty);
            let body = self.core.create_var(fresh, arg_ty);
            let lam_ty = arg_ty.map(|a| self.types.mk_fun(a, a));
            return Ok(self.core.create_lam(arg, body, lam_ty));
        }
        // Keep the symbol's own type wrapper-free too.
        if let Some(sym_ty) = self.core_symbols.get(symbol).ty {
            let inlined = self.inline_wrapper_ty(sym_ty)?;
            if inlined != sym_ty {
                self.core_symbols.get_mut(symbol).ty = Some(inlined);
            }
        }
        Ok(id)
    }

    fn simplify_lit(&mut self, id: CoreId) -> Result<CoreId> {
        if let CoreKind::Lit {
            value: crate::core::CoreLiteral::Array(elements),
        } = self.core.kind(id).clone()
        {
            let mut new_elements = Vec::with_capacity(elements.len());
            let mut changed = false;
            for element in elements {
                let simplified = self.go(element)?;
                changed |= simplified != element;
                new_elements.push(simplified);
            }
            if changed {
                let ty = self.core.ty(id);
                return Ok(self.core.alloc(
                    CoreKind::Lit {
                        value: crate::core::CoreLiteral::Array(new_elements),
                    },
                    ty,
                ));
            }
        }
        Ok(id)
    }

    fn simplify_let(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::Let { bind, body } = self.core.kind(id).clone() else {
            return Ok(id);
        };
        // Wrapper data declarations disappear.
        if let CoreKind::DataDecl { symbol, .. } = self.core.kind(bind) {
            if self.core_symbols.get(*symbol).is_wrapper {
                return match body {
                    Some(body) => Ok(body),
                    None => Ok(id),
                };
            }
        }
        let new_bind = self.go(bind)?;
        let new_body = match body {
            Some(body) => Some(self.go(body)?),
            None => None,
        };
        if new_bind == bind && new_body == body {
            return Ok(id);
        }
        let ty = new_body.and_then(|b| self.core.ty(b)).or(self.core.ty(id));
        Ok(self.core.create_let(new_bind, new_body, ty))
    }

    fn simplify_lam(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::Lam { arg, body } = self.core.kind(id).clone() else {
            return Ok(id);
        };
        let new_arg = self.go(arg)?;
        let new_body = self.go(body)?;
        if new_arg == arg && new_body == body {
            return Ok(id);
        }
        Ok(self.core.create_lam(new_arg, new_body, self.core.ty(id)))
    }

    fn simplify_bind(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::Bind {
            symbol,
            expr,
            initializer,
        } = self.core.kind(id).clone()
        else {
            return Ok(id);
        };
        if let Some(sym_ty) = self.core_symbols.get(symbol).ty {
            let inlined = self.inline_wrapper_ty(sym_ty)?;
            self.core_symbols.get_mut(symbol).ty = Some(inlined);
        }
        let new_expr = self.go(expr)?;
        let new_initializer = match initializer {
            Some(init) => Some(self.go(init)?),
            None => None,
        };
        if new_expr == expr && new_initializer == initializer {
            return Ok(id);
        }
        let ty = self.core.ty(new_expr);
        let bind = self
            .core
            .create_bind(symbol, new_expr, new_initializer, ty);
        self.core_symbols.get_mut(symbol).ast = Some(bind);
        Ok(bind)
    }

    fn simplify_bind_rec(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::BindRec { binds } = self.core.kind(id).clone() else {
            return Ok(id);
        };
        let mut new_binds = Vec::with_capacity(binds.len());
        let mut changed = false;
        for bind in binds {
            let simplified = self.go(bind)?;
            changed |= simplified != bind;
            new_binds.push(simplified);
        }
        if !changed {
            return Ok(id);
        }
        let ty = self.core.ty(id);
        Ok(self.core.alloc(CoreKind::BindRec { binds: new_binds }, ty))
    }

    fn simplify_loop(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::Loop {
            loop_kind,
            value_pat,
            value_init,
            body,
        } = self.core.kind(id).clone()
        else {
            return Ok(id);
        };
        let new_kind = match loop_kind.clone() {
            LoopKind::For {
                index_pat,
                range_init,
                max_loops,
            } => LoopKind::For {
                index_pat: self.go(index_pat)?,
                range_init: self.go(range_init)?,
                max_loops,
            },
            LoopKind::While { condition } => LoopKind::While {
                condition: self.go(condition)?,
            },
        };
        let new_pat = self.go(value_pat)?;
        let new_init = self.go(value_init)?;
        let new_body = self.go(body)?;
        if new_kind == loop_kind
            && new_pat == value_pat
            && new_init == value_init
            && new_body == body
        {
            return Ok(id);
        }
        let ty = self.core.ty(new_body).or(self.core.ty(id));
        Ok(self.core.alloc(
            CoreKind::Loop {
                loop_kind: new_kind,
                value_pat: new_pat,
                value_init: new_init,
                body: new_body,
            },
            ty,
        ))
    }

    fn simplify_data_decl(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::DataDecl { cons, .. } = self.core.kind(id).clone() else {
            return Ok(id);
        };
        for con in cons {
            if let CoreKind::DataCon { symbol, con_ty, .. } = self.core.kind(con).clone() {
                let inlined = self.inline_wrapper_ty(con_ty)?;
                if inlined != con_ty {
                    if let CoreKind::DataCon { con_ty, .. } = &mut self.core.get_mut(con).kind {
                        *con_ty = inlined;
                    }
                }
                if let Some(sym_ty) = self.core_symbols.get(symbol).ty {
                    let inlined = self.inline_wrapper_ty(sym_ty)?;
                    self.core_symbols.get_mut(symbol).ty = Some(inlined);
                }
            }
        }
        Ok(id)
    }

    fn simplify_case(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::Case { expr, alts } = self.core.kind(id).clone() else {
            return Ok(id);
        };

        if alts.len() == 1 {
            let CoreKind::CaseAlt { pat, body } = self.core.kind(alts[0]).clone() else {
                return Ok(id);
            };
            // case e of W v -> body  ==>  let v' = e in body[v := v']
            if let Some(pat) = pat {
                if let CoreKind::App { function, argument } = self.core.kind(pat).clone() {
                    let wrapper_app = match (
                        self.core.kind(function).clone(),
                        self.core.kind(argument).clone(),
                    ) {
                        (
                            CoreKind::Var { symbol: con },
                            CoreKind::Var { symbol: field },
                        ) if self.is_wrapper_con(con)
                            && !self.core_symbols.get(field).is_constructor =>
                        {
                            Some(field)
                        }
                        _ => None,
                    };
                    if let Some(field) = wrapper_app {
                        return self.case_to_let(expr, field, body);
                    }
                }
                // case e of v -> body  ==>  let v' = e in body[v := v']
                if let CoreKind::Var { symbol } = self.core.kind(pat).clone() {
                    if !self.core_symbols.get(symbol).is_constructor {
                        return self.case_to_let(expr, symbol, body);
                    }
                }
            }
        }

        let new_expr = self.go(expr)?;
        let mut new_alts = Vec::with_capacity(alts.len());
        let mut changed = new_expr != expr;
        for alt in alts {
            let CoreKind::CaseAlt { pat, body } = self.core.kind(alt).clone() else {
                continue;
            };
            let new_body = self.go(body)?;
            if new_body != body {
                changed = true;
                let alt_ty = self.core.ty(alt);
                new_alts.push(self.core.create_case_alt(pat, new_body, alt_ty));
            } else {
                new_alts.push(alt);
            }
        }
        if !changed {
            return Ok(id);
        }
        Ok(self.core.create_case(new_expr, new_alts, self.core.ty(id)))
    }

    /// Replace a trivial single-alternative case with a let binding the
    /// pattern variable to the scrutinee.
    fn case_to_let(
        &mut self,
        scrutinee: CoreId,
        pat_symbol: CoreSymbolId,
        body: CoreId,
    ) -> Result<CoreId> {
        let fresh = self.fresh_renamed(pat_symbol);
        let var_ty = self.core_symbols.get(pat_symbol).ty;
        let new_var = self.core.create_var(fresh, var_ty);
        self.core_symbols.get_mut(pat_symbol).inline_ast = Some(new_var);
        let bind_ty = self.core.ty(scrutinee).or(var_ty);
        let bind = self.core.create_bind(fresh, scrutinee, None, bind_ty);
        self.core_symbols.get_mut(fresh).ast = Some(bind);
        let body_ty = self.core.ty(body);
        Ok(self.core.create_let(bind, Some(body), body_ty))
    }

    fn simplify_app(&mut self, id: CoreId) -> Result<CoreId> {
        let CoreKind::App { function, argument } = self.core.kind(id).clone() else {
            return Ok(id);
        };

        // Fully applied wrapper constructors unwrap to their argument.
        if let CoreKind::Var { symbol } = self.core.kind(function) {
            let symbol = *symbol;
            if self.is_wrapper_con(symbol) {
                return Ok(argument);
            }
            // (id e) ==> e
            if self.is_base_fn(symbol, self.base.id_fn) {
                return Ok(argument);
            }
            if self.matches_identity_bind(symbol) {
                return Ok(argument);
            }
        }

        // Beta: (\x -> body) e ==> let x' = e in body[x := x']
        if let CoreKind::Lam { arg, body } = self.core.kind(function).clone() {
            if let CoreKind::Var { symbol } = self.core.kind(arg).clone() {
                return self.case_to_let(argument, symbol, body);
            }
        }

        // Pipes: e1 |> e2 ==> e2 e1 and e1 <| e2 ==> e1 e2.
        if let CoreKind::App {
            function: inner_fn,
            argument: left,
        } = self.core.kind(function).clone()
        {
            if let CoreKind::Var { symbol } = self.core.kind(inner_fn).clone() {
                if self.is_base_fn(symbol, self.base.pipe_forward)
                    || self.matches_pipe_forward_bind(symbol)
                {
                    return Ok(self.core.create_app(argument, left, self.core.ty(id)));
                }
                if self.is_base_fn(symbol, self.base.pipe_back)
                    || self.matches_pipe_back_bind(symbol)
                {
                    return Ok(self.core.create_app(left, argument, self.core.ty(id)));
                }
            }
        }

        let new_function = self.go(function)?;
        let new_argument = self.go(argument)?;
        if new_function == function && new_argument == argument {
            return Ok(id);
        }
        Ok(self
            .core
            .create_app(new_function, new_argument, self.core.ty(id)))
    }

    /// A user binding whose body is literally `\x -> x`.
    fn matches_identity_bind(&self, symbol: CoreSymbolId) -> bool {
        let Some(bind) = self.core_symbols.get(symbol).ast else {
            return false;
        };
        let CoreKind::Bind { expr, .. } = self.core.kind(bind) else {
            return false;
        };
        let CoreKind::Lam { arg, body } = self.core.kind(*expr) else {
            return false;
        };
        match (self.core.kind(*arg), self.core.kind(*body)) {
            (CoreKind::Var { symbol: arg_sym }, CoreKind::Var { symbol: body_sym }) => {
                arg_sym == body_sym
            }
            _ => false,
        }
    }

    /// A user binding whose body is literally `\x f -> f x`.
    fn matches_pipe_forward_bind(&self, symbol: CoreSymbolId) -> bool {
        self.matches_pipe_shape(symbol, true)
    }

    /// A user binding whose body is literally `\f x -> f x`.
    fn matches_pipe_back_bind(&self, symbol: CoreSymbolId) -> bool {
        self.matches_pipe_shape(symbol, false)
    }

    fn matches_pipe_shape(&self, symbol: CoreSymbolId, forward: bool) -> bool {
        let Some(bind) = self.core_symbols.get(symbol).ast else {
            return false;
        };
        let CoreKind::Bind { expr, .. } = self.core.kind(bind) else {
            return false;
        };
        let CoreKind::Lam {
            arg: arg1,
            body: body1,
        } = self.core.kind(*expr)
        else {
            return false;
        };
        let CoreKind::Lam {
            arg: arg2,
            body: body2,
        } = self.core.kind(*body1)
        else {
            return false;
        };
        let CoreKind::App { function, argument } = self.core.kind(*body2) else {
            return false;
        };
        let (
            CoreKind::Var { symbol: arg1_sym },
            CoreKind::Var { symbol: arg2_sym },
            CoreKind::Var { symbol: fn_sym },
            CoreKind::Var { symbol: app_arg_sym },
        ) = (
            self.core.kind(*arg1),
            self.core.kind(*arg2),
            self.core.kind(*function),
            self.core.kind(*argument),
        )
        else {
            return false;
        };
        if forward {
            fn_sym == arg2_sym && app_arg_sym == arg1_sym
        } else {
            fn_sym == arg1_sym && app_arg_sym == arg2_sym
        }
    }
}
