//! Defunctionalization (phase J).
//!
//! Following the higher-order defunctionalization strategy of Futhark
//! (Henriksen 2018), generalized over sum types and branches: every
//! expression of functional type is approximated by a static value and
//! rewritten until the only functional values left are top-level function
//! symbols. Partial applications become values of synthesized per-arity
//! `EnvN` data types carrying their captured arguments; applying an env
//! value unpacks it with a single-alternative case and calls the
//! underlying function directly. Saturated calls to higher-order
//! functions inline the callee. The synthesized `EnvN` declarations are
//! written into the top of the Core tree in creation order.

use rustc_hash::FxHashMap;

use crate::base::{Interner, SourceSpan};
use crate::core::{CoreArena, CoreAst, CoreAstSymbol, CoreId, CoreKind, CoreLiteral, CoreSymbolId, CoreSymbolTable, LoopKind};
use crate::error::Result;
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::{AstSymbol, StateType, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::unify::TypeEnv;
use crate::types::{TypeArena, TypeId, TypeTerm};

/// The compile-time approximation of a Core expression.
#[derive(Clone, Debug)]
pub enum StaticValue {
    /// A monomorphic non-functional value.
    Dyn { ty: TypeId },
    /// A reference to a known top-level function symbol.
    Fun {
        fn_symbol: CoreSymbolId,
        fn_ty: TypeId,
        expr_sv: Option<Box<StaticValue>>,
    },
    /// A partial application: an `EnvN` value carrying captures.
    Env {
        env_ty: TypeId,
        fn_ty: TypeId,
        env_con_symbol: CoreSymbolId,
        fn_symbol: CoreSymbolId,
        expr_sv: Box<StaticValue>,
        arg_svs: Vec<StaticValue>,
    },
    /// A known constructor, possibly partially applied.
    Con {
        con_symbol: CoreSymbolId,
        constructed_ty: TypeId,
        args: Vec<StaticValue>,
    },
}

impl StaticValue {
    pub fn ty(&self) -> TypeId {
        match self {
            StaticValue::Dyn { ty } => *ty,
            StaticValue::Fun { fn_ty, .. } => *fn_ty,
            StaticValue::Env { env_ty, .. } => *env_ty,
            StaticValue::Con { constructed_ty, .. } => *constructed_ty,
        }
    }
}

struct Defunctionalize<'a> {
    core: &'a mut CoreArena,
    core_symbols: &'a mut CoreSymbolTable,
    types: &'a mut TypeArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
    classes: &'a ClassTable,
    base: &'a BaseModule,
    interner: &'a mut Interner,
    static_values: FxHashMap<CoreSymbolId, StaticValue>,
    /// Per-arity env types: capture count -> (type symbol, con symbol).
    env_types: FxHashMap<usize, (CoreSymbolId, CoreSymbolId)>,
    /// Synthesized env data declarations, creation order.
    new_decls: Vec<CoreId>,
    fresh_counter: u32,
}

/// Rewrite the Core tree first-order.
#[allow(clippy::too_many_arguments)]
pub fn defunctionalize(
    core: &mut CoreArena,
    core_symbols: &mut CoreSymbolTable,
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
    let mut pass = Defunctionalize {
        core,
        core_symbols,
        types,
        symbols,
        scopes,
        classes,
        base,
        interner,
        static_values: FxHashMap::default(),
        env_types: FxHashMap::default(),
        new_decls: Vec::new(),
        fresh_counter: 0,
    };
    pass.go(root)?;

    // Prepend the synthesized env declarations.
    let mut new_root = pass.core.root;
    for &decl in pass.new_decls.iter().rev() {
        new_root = Some(pass.core.create_let(decl, new_root, None));
    }
    pass.core.root = new_root;
    Ok(())
}

impl<'a> Defunctionalize<'a> {
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

    fn fresh_symbol(&mut self, prefix: &str, ty: Option<TypeId>) -> CoreSymbolId {
        self.fresh_counter += 1;
        let name = self
            .interner
            .intern(&format!("{}@{}", prefix, self.fresh_counter));
        self.core_symbols.insert(CoreAstSymbol::new(name, ty))
    }

    fn node_ty(&self, id: CoreId) -> TypeId {
        self.core.ty(id).expect("core node typed by translation")
    }

    fn unit_ty(&self) -> TypeId {
        self.symbols
            .get(self.base.unit_type)
            .ty
            .expect("unit typed")
    }

    fn replace_node(&mut self, id: CoreId, with: CoreId) {
        let kind = self.core.kind(with).clone();
        let ty = self.core.ty(with);
        *self.core.get_mut(id) = CoreAst { kind, ty };
    }

    fn is_fun_ty(&self, ty: TypeId) -> bool {
        let ty = self.types.find_const(ty);
        matches!(self.types.term(ty), TypeTerm::Fun { .. })
    }

    /// Any parameter of functional type makes a function higher order.
    fn is_higher_order(&self, ty: TypeId, arity: usize) -> bool {
        let mut current = self.types.find_const(ty);
        for _ in 0..arity {
            match self.types.term(current) {
                TypeTerm::Fun { arg, result } => {
                    if self.is_fun_ty(*arg) {
                        return true;
                    }
                    current = self.types.find_const(*result);
                }
                _ => break,
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Env data types
    // ------------------------------------------------------------------

    /// The per-arity env data type, synthesized on first use.
    fn env_type_for(&mut self, n: usize) -> (CoreSymbolId, CoreSymbolId) {
        if let Some(&cached) = self.env_types.get(&n) {
            return cached;
        }
        let type_name = self.interner.intern(&format!("Env{n}"));
        let module_name = self.base.module_name.clone();

        // Front-end symbol for the type constructor, so env types print
        // and unify like any other type.
        let ast_type_symbol = self.symbols.insert(AstSymbol::new(
            type_name.clone(),
            type_name.clone(),
            module_name.clone(),
            SourceSpan::NULL,
        ));
        let mut kind = self.base.star_kind_ty;
        for _ in 0..n {
            kind = self.types.mk_fun(self.base.star_kind_ty, kind);
        }
        let type_con_ty = self.types.mk_con(ast_type_symbol, Vec::new());
        self.types.get_mut(type_con_ty).kind_of = Some(kind);
        self.symbols.get_mut(ast_type_symbol).ty = Some(type_con_ty);

        // forall a1..aN. a1 -> .. -> aN -> EnvN a1..aN
        let mut var_symbols = Vec::with_capacity(n);
        let mut var_tys = Vec::with_capacity(n);
        for i in 0..n {
            let var_name = self.interner.intern(&format!("a{i}"));
            let var_symbol = self.symbols.fresh(
                var_name,
                module_name.clone(),
                SourceSpan::NULL,
            );
            let var_ty = self.types.mk_rigid_var(var_symbol, None);
            self.types.get_mut(var_ty).kind_of = Some(self.base.star_kind_ty);
            self.symbols.get_mut(var_symbol).ty = Some(var_ty);
            var_symbols.push(var_symbol);
            var_tys.push(var_ty);
        }
        let applied = self.types.mk_con(ast_type_symbol, var_tys.clone());
        self.types.get_mut(applied).kind_of = Some(self.base.star_kind_ty);
        let mut con_ty = self.types.mk_fun_chain(&var_tys, applied);
        for &var in var_symbols.iter().rev() {
            con_ty = self.types.mk_for_all(var, Vec::new(), con_ty);
        }
        let ast_con_symbol = self.symbols.insert(AstSymbol::new(
            type_name.clone(),
            type_name.clone(),
            module_name,
            SourceSpan::NULL,
        ));
        {
            let sym = self.symbols.get_mut(ast_con_symbol);
            sym.ty = Some(con_ty);
            sym.is_constructor = true;
            sym.arity = Some(n);
        }

        // Core symbols and the data declaration.
        let mut core_type_symbol = CoreAstSymbol::new(type_name.clone(), Some(type_con_ty));
        core_type_symbol.ast_symbol = Some(ast_type_symbol);
        let core_type_symbol = self.core_symbols.insert(core_type_symbol);
        let mut core_con_symbol = CoreAstSymbol::new(type_name, Some(con_ty));
        core_con_symbol.ast_symbol = Some(ast_con_symbol);
        core_con_symbol.is_constructor = true;
        core_con_symbol.arity = n;
        core_con_symbol.state_type = StateType::Poly;
        let core_con_symbol = self.core_symbols.insert(core_con_symbol);

        let con_node = self.core.create_data_con(core_con_symbol, con_ty, applied);
        self.core_symbols.get_mut(core_con_symbol).ast = Some(con_node);
        let decl = self
            .core
            .create_data_decl(core_type_symbol, vec![con_node], Some(type_con_ty));
        self.core_symbols.get_mut(core_type_symbol).ast = Some(decl);
        self.new_decls.push(decl);
        self.static_values.insert(
            core_con_symbol,
            StaticValue::Fun {
                fn_symbol: core_con_symbol,
                fn_ty: con_ty,
                expr_sv: Some(Box::new(StaticValue::Dyn { ty: applied })),
            },
        );

        self.env_types.insert(n, (core_type_symbol, core_con_symbol));
        (core_type_symbol, core_con_symbol)
    }

    /// Turn an (under-saturated) application or bare function var into an
    /// env value: defunctionalize the provided arguments, swap the head
    /// var for the env constructor, and describe the result.
    fn env_from_expr(
        &mut self,
        ast: CoreId,
        fn_ty: TypeId,
        fn_symbol: CoreSymbolId,
        fn_expr_sv: Option<StaticValue>,
    ) -> Result<StaticValue> {
        // Count provided arguments and find the head var.
        let mut args = Vec::new();
        let mut head = ast;
        while let CoreKind::App { function, argument } = self.core.kind(head).clone() {
            args.push(argument);
            head = function;
        }
        args.reverse();

        let mut arg_svs = Vec::with_capacity(args.len());
        let mut arg_tys = Vec::with_capacity(args.len());
        for &arg in &args {
            let mut sv = self.go_expr(arg)?;
            if let StaticValue::Fun {
                fn_symbol: inner_fn,
                fn_ty: inner_ty,
                expr_sv,
            } = sv.clone()
            {
                sv = self.env_from_expr(arg, inner_ty, inner_fn, expr_sv.map(|b| *b))?;
            }
            arg_tys.push(sv.ty());
            arg_svs.push(sv);
        }

        let (env_type_symbol, env_con_symbol) = self.env_type_for(args.len());
        let env_ast_symbol = self
            .core_symbols
            .get(env_type_symbol)
            .ast_symbol
            .expect("env type has front-end symbol");
        let env_ty = self.types.mk_con(env_ast_symbol, arg_tys);
        self.types.get_mut(env_ty).kind_of = Some(self.base.star_kind_ty);

        // The head var becomes the env constructor.
        let con_ty = self.core_symbols.get(env_con_symbol).ty;
        let con_inst = con_ty.map(|ty| {
            let (inst, _) = self.env().instantiate(ty, None);
            inst
        });
        let con_var = self.core.create_var(env_con_symbol, con_inst);
        self.replace_node(head, con_var);
        self.core.set_ty(ast, env_ty);

        Ok(StaticValue::Env {
            env_ty,
            fn_ty,
            env_con_symbol,
            fn_symbol,
            expr_sv: Box::new(fn_expr_sv.unwrap_or(StaticValue::Dyn {
                ty: self.types.fully_applied_result(fn_ty),
            })),
            arg_svs,
        })
    }

    // ------------------------------------------------------------------
    // The walk
    // ------------------------------------------------------------------

    /// Top-level let chain.
    fn go(&mut self, id: CoreId) -> Result<()> {
        let mut current = Some(id);
        while let Some(node) = current {
            match self.core.kind(node).clone() {
                CoreKind::Let { bind, body } => {
                    // Inline single-var aliases. Constructor values and
                    // `_primUndefined` keep their bindings.
                    if let CoreKind::Bind { symbol, expr, .. } = self.core.kind(bind).clone() {
                        let expr_is_plain_var = matches!(
                            self.core.kind(expr),
                            CoreKind::Var { symbol }
                                if !self.core_symbols.get(*symbol).is_constructor
                                    && self.core_symbols.get(*symbol).ast_symbol
                                        != Some(self.base.prim_undefined)
                        );
                        if expr_is_plain_var && body.is_some() {
                            self.core_symbols.get_mut(symbol).inline_ast = Some(expr);
                            let body = body.expect("checked above");
                            let body_kind = self.core.kind(body).clone();
                            let body_ty = self.core.ty(body);
                            *self.core.get_mut(node) = CoreAst {
                                kind: body_kind,
                                ty: body_ty,
                            };
                            continue;
                        }
                    }
                    self.go_expr(bind)?;
                    current = body;
                }
                _ => {
                    self.go_expr(node)?;
                    current = None;
                }
            }
        }
        Ok(())
    }

    fn go_expr(&mut self, id: CoreId) -> Result<StaticValue> {
        match self.core.kind(id).clone() {
            CoreKind::Lit { value } => {
                if let CoreLiteral::Array(elements) = &value {
                    for &element in elements {
                        self.go_expr(element)?;
                    }
                }
                Ok(StaticValue::Dyn {
                    ty: self.node_ty(id),
                })
            }

            CoreKind::Var { symbol } => self.go_var(id, symbol),

            CoreKind::App { .. } => self.go_app(id),

            CoreKind::Lam { arg, body } => self.go_lam(id, arg, body),

            CoreKind::Let { .. } => {
                self.go(id)?;
                Ok(StaticValue::Dyn {
                    ty: self.core.ty(id).unwrap_or_else(|| self.unit_ty()),
                })
            }

            CoreKind::Bind { .. } => self.go_bind(id),

            CoreKind::BindRec { binds } => {
                for bind in binds {
                    self.go_expr(bind)?;
                }
                Ok(StaticValue::Dyn {
                    ty: self.core.ty(id).unwrap_or_else(|| self.unit_ty()),
                })
            }

            CoreKind::Case { expr, alts } => {
                self.go_expr(expr)?;
                let mut alt_sv = None;
                for alt in &alts {
                    let CoreKind::CaseAlt { pat, body } = self.core.kind(*alt).clone() else {
                        continue;
                    };
                    if let Some(pat) = pat {
                        self.register_pattern_vars(pat);
                    }
                    let sv = self.go_expr(body)?;
                    alt_sv = Some(sv);
                }
                if alts.len() == 1 {
                    Ok(alt_sv.unwrap_or(StaticValue::Dyn {
                        ty: self.node_ty(id),
                    }))
                } else {
                    Ok(StaticValue::Dyn {
                        ty: self.node_ty(id),
                    })
                }
            }

            CoreKind::CaseAlt { body, .. } => self.go_expr(body),

            CoreKind::DataDecl { cons, .. } => {
                for con in cons {
                    self.go_data_con(con);
                }
                Ok(StaticValue::Dyn {
                    ty: self.core.ty(id).unwrap_or_else(|| self.unit_ty()),
                })
            }

            CoreKind::DataCon { .. } => {
                self.go_data_con(id);
                Ok(StaticValue::Dyn {
                    ty: self.core.ty(id).unwrap_or_else(|| self.unit_ty()),
                })
            }

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
                    } => {
                        self.register_pattern_vars(index_pat);
                        self.go_expr(range_init)?;
                    }
                    LoopKind::While { condition } => {
                        self.go_expr(condition)?;
                    }
                }
                self.register_pattern_vars(value_pat);
                self.go_expr(value_init)?;
                self.go_expr(body)
            }
        }
    }

    fn register_pattern_vars(&mut self, pat: CoreId) {
        match self.core.kind(pat).clone() {
            CoreKind::Var { symbol } => {
                if !self.core_symbols.get(symbol).is_constructor {
                    let ty = self
                        .core_symbols
                        .get(symbol)
                        .ty
                        .or(self.core.ty(pat))
                        .unwrap_or_else(|| self.unit_ty());
                    self.static_values
                        .insert(symbol, StaticValue::Dyn { ty });
                }
            }
            CoreKind::App { function, argument } => {
                self.register_pattern_vars(function);
                self.register_pattern_vars(argument);
            }
            _ => {}
        }
    }

    fn go_data_con(&mut self, con: CoreId) {
        let CoreKind::DataCon {
            symbol,
            con_ty,
            data_type_ty,
        } = self.core.kind(con).clone()
        else {
            return;
        };
        let mut arity = 0;
        let mut ty = self.types.strip_for_all(con_ty);
        loop {
            ty = self.types.find_const(ty);
            match self.types.term(ty) {
                TypeTerm::Fun { result, .. } => {
                    arity += 1;
                    ty = *result;
                }
                _ => break,
            }
        }
        self.core_symbols.get_mut(symbol).arity = arity;
        let sv = if arity > 0 {
            StaticValue::Fun {
                fn_symbol: symbol,
                fn_ty: con_ty,
                expr_sv: Some(Box::new(StaticValue::Dyn { ty: data_type_ty })),
            }
        } else {
            StaticValue::Dyn { ty: data_type_ty }
        };
        self.static_values.insert(symbol, sv);
    }

    fn go_var(&mut self, id: CoreId, symbol: CoreSymbolId) -> Result<StaticValue> {
        // _primUndefined approximates as Dyn at any type.
        if self.core_symbols.get(symbol).ast_symbol == Some(self.base.prim_undefined) {
            return Ok(StaticValue::Dyn {
                ty: self.node_ty(id),
            });
        }
        if let Some(inline_ast) = self.core_symbols.get(symbol).inline_ast {
            let copied = self.core.deep_copy(inline_ast);
            self.replace_node(id, copied);
            return self.go_expr(id);
        }
        if self.core_symbols.get(symbol).is_constructor {
            let ty = self.node_ty(id);
            if self.is_fun_ty(ty) {
                let result = self.types.fully_applied_result(ty);
                return Ok(StaticValue::Fun {
                    fn_symbol: symbol,
                    fn_ty: ty,
                    expr_sv: Some(Box::new(StaticValue::Dyn { ty: result })),
                });
            }
            return Ok(StaticValue::Dyn { ty });
        }
        if let Some(sv) = self.static_values.get(&symbol) {
            return Ok(sv.clone());
        }
        // Primitive functions are known top-level symbols; quantified
        // primitives take their ground type from the use site.
        let ty = match self.core_symbols.get(symbol).ty {
            Some(t) if !self.types.is_polymorphic(t) => t,
            _ => self.node_ty(id),
        };
        if self.is_fun_ty(ty) {
            let result = self.types.fully_applied_result(ty);
            Ok(StaticValue::Fun {
                fn_symbol: symbol,
                fn_ty: ty,
                expr_sv: Some(Box::new(StaticValue::Dyn { ty: result })),
            })
        } else {
            Ok(StaticValue::Dyn { ty })
        }
    }

    fn go_lam(&mut self, _id: CoreId, arg: CoreId, body: CoreId) -> Result<StaticValue> {
        if let CoreKind::Var { symbol } = self.core.kind(arg).clone() {
            let arg_ty = self
                .core_symbols
                .get(symbol)
                .ty
                .or(self.core.ty(arg))
                .unwrap_or_else(|| self.unit_ty());
            // Higher-order parameters are Dyn until their call sites
            // inline them away.
            self.static_values
                .insert(symbol, StaticValue::Dyn { ty: arg_ty });
            let mut param_arity = 0;
            let mut ty = self.types.find_const(arg_ty);
            while let TypeTerm::Fun { result, .. } = self.types.term(ty) {
                param_arity += 1;
                ty = self.types.find_const(*result);
            }
            self.core_symbols.get_mut(symbol).arity = param_arity;
        }
        let expr_sv = self.go_expr(body)?;
        if let StaticValue::Fun {
            fn_symbol,
            fn_ty,
            expr_sv: inner,
        } = expr_sv.clone()
        {
            // A lambda returning a bare function value becomes a lambda
            // returning an env value.
            return self.env_from_expr(body, fn_ty, fn_symbol, inner.map(|b| *b));
        }
        Ok(expr_sv)
    }

    fn go_bind(&mut self, id: CoreId) -> Result<StaticValue> {
        let CoreKind::Bind {
            symbol,
            expr,
            initializer,
        } = self.core.kind(id).clone()
        else {
            unreachable!("bind expected");
        };
        self.core_symbols.get_mut(symbol).ast = Some(id);
        let arity = self.core.num_args(id);
        self.core_symbols.get_mut(symbol).arity = arity;
        if let Some(initializer) = initializer {
            self.go_expr(initializer)?;
        }

        let bind_ty = self
            .core_symbols
            .get(symbol)
            .ty
            .or(self.core.ty(id))
            .unwrap_or_else(|| self.unit_ty());

        // Higher-order functions are skipped; saturated call sites inline
        // them instead.
        if !self.core_symbols.get(symbol).is_constructor && self.is_higher_order(bind_ty, arity)
        {
            let sv = if matches!(self.core.kind(expr), CoreKind::Lam { .. }) {
                StaticValue::Fun {
                    fn_symbol: symbol,
                    fn_ty: bind_ty,
                    expr_sv: None,
                }
            } else {
                StaticValue::Dyn { ty: bind_ty }
            };
            self.static_values.insert(symbol, sv.clone());
            return Ok(sv);
        }

        let expr_sv = self.go_expr(expr)?;
        if matches!(self.core.kind(expr), CoreKind::Lam { .. }) {
            if let StaticValue::Env { env_ty, .. } = &expr_sv {
                // The bind's result type narrows to the env type.
                let env_ty = *env_ty;
                let new_bind_ty = self.replace_result_ty(bind_ty, arity, env_ty);
                self.core_symbols.get_mut(symbol).ty = Some(new_bind_ty);
            }
            let fn_ty = self
                .core_symbols
                .get(symbol)
                .ty
                .unwrap_or(bind_ty);
            let sv = StaticValue::Fun {
                fn_symbol: symbol,
                fn_ty,
                expr_sv: Some(Box::new(expr_sv)),
            };
            self.static_values.insert(symbol, sv.clone());
            Ok(sv)
        } else {
            self.core_symbols.get_mut(symbol).ty = Some(expr_sv.ty());
            self.static_values.insert(symbol, expr_sv.clone());
            Ok(expr_sv)
        }
    }

    /// Rebuild an arrow chain with the result after `arity` arguments
    /// replaced.
    fn replace_result_ty(&mut self, ty: TypeId, arity: usize, new_result: TypeId) -> TypeId {
        if arity == 0 {
            return new_result;
        }
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Fun { arg, result } => {
                let new_inner = self.replace_result_ty(result, arity - 1, new_result);
                self.types.mk_fun(arg, new_inner)
            }
            _ => new_result,
        }
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    fn go_app(&mut self, id: CoreId) -> Result<StaticValue> {
        // Application spine.
        let mut app_count = 0;
        let mut head = id;
        while let CoreKind::App { function, .. } = self.core.kind(head) {
            app_count += 1;
            head = *function;
        }

        let fn_sv = self.go_expr(head)?;
        match fn_sv {
            StaticValue::Fun {
                fn_symbol,
                fn_ty,
                expr_sv,
            } => self.app_fun(id, head, fn_symbol, fn_ty, expr_sv.map(|b| *b), app_count),
            StaticValue::Env {
                env_ty,
                fn_ty,
                env_con_symbol,
                fn_symbol,
                expr_sv,
                arg_svs,
            } => self.app_env(
                id,
                head,
                env_ty,
                fn_ty,
                env_con_symbol,
                fn_symbol,
                *expr_sv,
                arg_svs,
                app_count,
            ),
            other => {
                // Applying a Dyn/Con head: arguments still defunctionalize.
                let args = self.spine_args(id, app_count);
                for arg in args {
                    self.go_expr(arg)?;
                }
                let _ = other;
                Ok(StaticValue::Dyn {
                    ty: self.node_ty(id),
                })
            }
        }
    }

    /// Arguments of the spine rooted at `id`, in application order.
    fn spine_args(&self, id: CoreId, app_count: usize) -> Vec<CoreId> {
        let mut args = Vec::with_capacity(app_count);
        let mut current = id;
        while let CoreKind::App { function, argument } = self.core.kind(current) {
            args.push(*argument);
            current = *function;
        }
        args.reverse();
        args
    }

    #[allow(clippy::too_many_arguments)]
    fn app_fun(
        &mut self,
        id: CoreId,
        head: CoreId,
        fn_symbol: CoreSymbolId,
        fn_ty: TypeId,
        expr_sv: Option<StaticValue>,
        app_count: usize,
    ) -> Result<StaticValue> {
        let arity = self.core_symbols.get(fn_symbol).arity;
        let is_constructor = self.core_symbols.get(fn_symbol).is_constructor;
        if app_count == arity {
            if is_constructor {
                return self.app_con(id, head, fn_symbol, app_count);
            }
            if self.is_higher_order(fn_ty, arity) {
                return self.inline_saturated(id, fn_symbol, app_count);
            }
            // Saturated first-order call: nothing to rewrite.
            let args = self.spine_args(id, app_count);
            for arg in args {
                self.go_expr(arg)?;
            }
            Ok(expr_sv.unwrap_or(StaticValue::Dyn {
                ty: self.node_ty(id),
            }))
        } else if app_count < arity {
            // Under-saturated: capture into an env value.
            self.env_from_expr(id, fn_ty, fn_symbol, expr_sv)
        } else {
            // Over-saturated: let-split and recurse.
            self.let_split(id, app_count - arity)
        }
    }

    fn app_con(
        &mut self,
        id: CoreId,
        head: CoreId,
        con_symbol: CoreSymbolId,
        app_count: usize,
    ) -> Result<StaticValue> {
        let args = self.spine_args(id, app_count);
        let mut arg_svs = Vec::with_capacity(args.len());
        let mut arg_tys = Vec::with_capacity(args.len());
        for &arg in &args {
            let mut sv = self.go_expr(arg)?;
            if let StaticValue::Fun {
                fn_symbol: inner_fn,
                fn_ty: inner_ty,
                expr_sv,
            } = sv.clone()
            {
                sv = self.env_from_expr(arg, inner_ty, inner_fn, expr_sv.map(|b| *b))?;
            }
            arg_tys.push(sv.ty());
            arg_svs.push(sv);
        }

        // When a capture became an env value, the constructed type's
        // arguments must follow so the data type carries the env type.
        let has_env_arg = arg_svs
            .iter()
            .any(|sv| matches!(sv, StaticValue::Env { .. }));
        let result_ty = {
            let con_ty = self.node_ty(id);
            let found = self.types.find(con_ty);
            match self.types.term(found).clone() {
                TypeTerm::Con { symbol, args } if has_env_arg && args.len() == arg_tys.len() => {
                    let rebuilt = self.types.mk_con(symbol, arg_tys);
                    self.types.get_mut(rebuilt).kind_of = Some(self.base.star_kind_ty);
                    rebuilt
                }
                _ => found,
            }
        };
        self.core.set_ty(id, result_ty);
        let _ = head;
        Ok(StaticValue::Con {
            con_symbol,
            constructed_ty: result_ty,
            args: arg_svs,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn app_env(
        &mut self,
        id: CoreId,
        head: CoreId,
        env_ty: TypeId,
        fn_ty: TypeId,
        env_con_symbol: CoreSymbolId,
        fn_symbol: CoreSymbolId,
        expr_sv: StaticValue,
        arg_svs: Vec<StaticValue>,
        app_count: usize,
    ) -> Result<StaticValue> {
        let free_var_count = arg_svs.len();
        let arity = self.core_symbols.get(fn_symbol).arity;
        let provided = app_count + free_var_count;

        if provided > arity {
            return self.let_split(id, provided - arity);
        }

        // Unpack the env value: case env_val of EnvN f1 .. fk -> ...
        // The call applies the underlying function to the captures and
        // then the spine's arguments.
        let env_arg_tys: Vec<TypeId> = {
            let found = self.types.find(env_ty);
            match self.types.term(found).clone() {
                TypeTerm::Con { args, .. } => args,
                _ => Vec::new(),
            }
        };
        let is_env_fn = !env_arg_tys.is_empty();

        let fn_var_ty = self.core_symbols.get(fn_symbol).ty.unwrap_or(fn_ty);
        let fn_var = self.core.create_var(fn_symbol, Some(fn_var_ty));
        let mut call = fn_var;
        let mut pat = None;
        if is_env_fn {
            let con_inst = self.core_symbols.get(env_con_symbol).ty.map(|ty| {
                let (inst, _) = self.env().instantiate(ty, None);
                inst
            });
            let mut pat_acc = self.core.create_var(env_con_symbol, con_inst);
            for &field_ty in &env_arg_tys {
                let field_sym = self.fresh_symbol("free_var", Some(field_ty));
                self.static_values
                    .insert(field_sym, StaticValue::Dyn { ty: field_ty });
                let field_pat = self.core.create_var(field_sym, Some(field_ty));
                let field_use = self.core.create_var(field_sym, Some(field_ty));
                pat_acc = self.core.create_app(pat_acc, field_pat, None);
                call = self.core.create_app(call, field_use, None);
            }
            pat = Some(pat_acc);
        }

        let args = self.spine_args(id, app_count);
        for &arg in &args {
            self.go_expr(arg)?;
            call = self.core.create_app(call, arg, None);
        }

        if provided == arity {
            // Saturated env application.
            let result_ty = self.node_ty(id);
            self.core.set_ty(call, result_ty);
            let rewritten = if is_env_fn {
                // The head var currently names the env value.
                let scrutinee = self.core.deep_copy(head);
                let alt = self.core.create_case_alt(pat, call, Some(result_ty));
                self.core
                    .create_case(scrutinee, vec![alt], Some(result_ty))
            } else {
                call
            };
            self.replace_node(id, rewritten);
            Ok(expr_sv)
        } else {
            // Under-saturated: extend into a wider env value.
            let extended = self.env_from_expr(call, fn_ty, fn_symbol, Some(expr_sv))?;
            let env_result_ty = extended.ty();
            let rewritten = if is_env_fn {
                let scrutinee = self.core.deep_copy(head);
                let alt = self.core.create_case_alt(pat, call, Some(env_result_ty));
                self.core
                    .create_case(scrutinee, vec![alt], Some(env_result_ty))
            } else {
                call
            };
            self.replace_node(id, rewritten);
            Ok(extended)
        }
    }

    /// `f x y z` with arity shorter than the spine splits into
    /// `let tmp = f x in tmp y z`.
    fn let_split(&mut self, id: CoreId, over_by: usize) -> Result<StaticValue> {
        let mut inner = id;
        for _ in 0..over_by {
            let CoreKind::App { function, .. } = self.core.kind(inner) else {
                break;
            };
            inner = *function;
        }
        let tmp_ty = self.core.ty(inner);
        let tmp_symbol = self.fresh_symbol("tmp", tmp_ty);

        // Move the inner application out and substitute the temporary.
        let inner_kind = self.core.kind(inner).clone();
        let moved = self.core.alloc(inner_kind, tmp_ty);
        let tmp_var = self.core.create_var(tmp_symbol, tmp_ty);
        self.replace_node(inner, tmp_var);

        let bind = self.core.create_bind(tmp_symbol, moved, None, tmp_ty);
        self.core_symbols.get_mut(tmp_symbol).ast = Some(bind);

        // The outer application becomes the let body.
        let outer_kind = self.core.kind(id).clone();
        let outer_ty = self.core.ty(id);
        let outer = self.core.alloc(outer_kind, outer_ty);
        let let_node = self.core.create_let(bind, Some(outer), outer_ty);
        self.replace_node(id, let_node);

        // Process the bind, then the body.
        self.go_expr(bind)?;
        self.go_expr(outer)
    }

    /// Inline a saturated call to a higher-order function: the callee's
    /// parameters become lets over the arguments, and the inlined body is
    /// recursively defunctionalized.
    fn inline_saturated(
        &mut self,
        id: CoreId,
        fn_symbol: CoreSymbolId,
        app_count: usize,
    ) -> Result<StaticValue> {
        let args = self.spine_args(id, app_count);
        let Some(bind) = self.core_symbols.get(fn_symbol).ast else {
            // No body to inline (primitive); treat as opaque.
            for arg in args {
                self.go_expr(arg)?;
            }
            return Ok(StaticValue::Dyn {
                ty: self.node_ty(id),
            });
        };
        let CoreKind::Bind { expr, .. } = self.core.kind(bind).clone() else {
            return Ok(StaticValue::Dyn {
                ty: self.node_ty(id),
            });
        };

        // Freshen the whole callee body so parameter symbols stay unique.
        let mut rename: FxHashMap<CoreSymbolId, CoreSymbolId> = FxHashMap::default();
        let copied = self.copy_renamed(expr, &mut rename);

        // Strip the lambda chain, binding each parameter to its argument.
        let mut params = Vec::with_capacity(app_count);
        let mut body = copied;
        for _ in 0..app_count {
            let CoreKind::Lam { arg, body: inner } = self.core.kind(body).clone() else {
                break;
            };
            if let CoreKind::Var { symbol } = self.core.kind(arg) {
                params.push(*symbol);
            }
            body = inner;
        }

        let mut result = body;
        for (&param, &arg) in params.iter().zip(args.iter()).rev() {
            let arg_ty = self.core.ty(arg);
            let bind = self.core.create_bind(param, arg, None, arg_ty);
            self.core_symbols.get_mut(param).ast = Some(bind);
            let body_ty = self.core.ty(result);
            result = self.core.create_let(bind, Some(result), body_ty);
        }
        self.replace_node(id, result);
        self.go_expr(id)
    }

    /// Deep copy with fresh binder symbols.
    fn copy_renamed(
        &mut self,
        id: CoreId,
        rename: &mut FxHashMap<CoreSymbolId, CoreSymbolId>,
    ) -> CoreId {
        let ty = self.core.ty(id);
        let kind = match self.core.kind(id).clone() {
            CoreKind::Var { symbol } => CoreKind::Var {
                symbol: rename.get(&symbol).copied().unwrap_or(symbol),
            },
            CoreKind::Lit { value } => {
                let value = match value {
                    CoreLiteral::Array(elements) => CoreLiteral::Array(
                        elements
                            .iter()
                            .map(|&e| self.copy_renamed(e, rename))
                            .collect(),
                    ),
                    other => other,
                };
                CoreKind::Lit { value }
            }
            CoreKind::App { function, argument } => CoreKind::App {
                function: self.copy_renamed(function, rename),
                argument: self.copy_renamed(argument, rename),
            },
            CoreKind::Lam { arg, body } => {
                if let CoreKind::Var { symbol } = self.core.kind(arg).clone() {
                    let fresh = self.rename_symbol(symbol);
                    rename.insert(symbol, fresh);
                }
                CoreKind::Lam {
                    arg: self.copy_renamed(arg, rename),
                    body: self.copy_renamed(body, rename),
                }
            }
            CoreKind::Let { bind, body } => {
                if let CoreKind::Bind { symbol, .. } = self.core.kind(bind).clone() {
                    let fresh = self.rename_symbol(symbol);
                    rename.insert(symbol, fresh);
                }
                CoreKind::Let {
                    bind: self.copy_renamed(bind, rename),
                    body: body.map(|b| self.copy_renamed(b, rename)),
                }
            }
            CoreKind::Bind {
                symbol,
                expr,
                initializer,
            } => CoreKind::Bind {
                symbol: rename.get(&symbol).copied().unwrap_or(symbol),
                expr: self.copy_renamed(expr, rename),
                initializer: initializer.map(|i| self.copy_renamed(i, rename)),
            },
            CoreKind::BindRec { binds } => CoreKind::BindRec {
                binds: binds
                    .iter()
                    .map(|&b| self.copy_renamed(b, rename))
                    .collect(),
            },
            CoreKind::Case { expr, alts } => CoreKind::Case {
                expr: self.copy_renamed(expr, rename),
                alts: alts
                    .iter()
                    .map(|&a| self.copy_renamed(a, rename))
                    .collect(),
            },
            CoreKind::CaseAlt { pat, body } => {
                if let Some(pat) = pat {
                    self.rename_pattern_binders(pat, rename);
                }
                CoreKind::CaseAlt {
                    pat: pat.map(|p| self.copy_renamed(p, rename)),
                    body: self.copy_renamed(body, rename),
                }
            }
            CoreKind::DataDecl { symbol, cons } => CoreKind::DataDecl {
                symbol,
                cons: cons
                    .iter()
                    .map(|&c| self.copy_renamed(c, rename))
                    .collect(),
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
                    } => {
                        self.rename_pattern_binders(index_pat, rename);
                        LoopKind::For {
                            index_pat: self.copy_renamed(index_pat, rename),
                            range_init: self.copy_renamed(range_init, rename),
                            max_loops,
                        }
                    }
                    LoopKind::While { condition } => LoopKind::While {
                        condition: self.copy_renamed(condition, rename),
                    },
                };
                self.rename_pattern_binders(value_pat, rename);
                CoreKind::Loop {
                    loop_kind,
                    value_pat: self.copy_renamed(value_pat, rename),
                    value_init: self.copy_renamed(value_init, rename),
                    body: self.copy_renamed(body, rename),
                }
            }
        };
        self.core.alloc(kind, ty)
    }

    fn rename_symbol(&mut self, symbol: CoreSymbolId) -> CoreSymbolId {
        self.fresh_counter += 1;
        let base_name = self.core_symbols.get(symbol).name.clone();
        let name = self
            .interner
            .intern(&format!("{}@{}", base_name.as_str(), self.fresh_counter));
        let original = self.core_symbols.get(symbol).clone();
        let mut fresh = CoreAstSymbol::new(name, original.ty);
        fresh.source_name = original.source_name;
        fresh.arity = original.arity;
        fresh.state_type = original.state_type;
        self.core_symbols.insert(fresh)
    }

    fn rename_pattern_binders(
        &mut self,
        pat: CoreId,
        rename: &mut FxHashMap<CoreSymbolId, CoreSymbolId>,
    ) {
        match self.core.kind(pat).clone() {
            CoreKind::Var { symbol } => {
                if !self.core_symbols.get(symbol).is_constructor
                    && !rename.contains_key(&symbol)
                {
                    let fresh = self.rename_symbol(symbol);
                    rename.insert(symbol, fresh);
                }
            }
            CoreKind::App { function, argument } => {
                self.rename_pattern_binders(function, rename);
                self.rename_pattern_binders(argument, rename);
            }
            _ => {}
        }
    }
}
