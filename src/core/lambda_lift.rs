//! Lambda lifting (phase I).
//!
//! Hoists every nested lambda to the top level. The lifted binding takes
//! the lambda's free variables as extra leading parameters, and the
//! original expression becomes an application of the lifted function to
//! the captured values. After this pass every lambda is the leading chain
//! of a top-level bind; partial applications left behind are
//! defunctionalization's input.

use rustc_hash::FxHashSet;

use crate::base::Interner;
use crate::core::{CoreArena, CoreAstSymbol, CoreId, CoreKind, CoreSymbolId, CoreSymbolTable, LoopKind};
use crate::types::{TypeArena, TypeId, TypeTerm};

struct LambdaLift<'a> {
    core: &'a mut CoreArena,
    core_symbols: &'a mut CoreSymbolTable,
    types: &'a mut TypeArena,
    interner: &'a mut Interner,
    /// Symbols visible at the top level (binds, constructors, prims).
    globals: FxHashSet<CoreSymbolId>,
    /// Lifted binds awaiting insertion before the current top bind.
    lifted: Vec<CoreId>,
    fresh_counter: u32,
}

/// Lift all nested lambdas to the top level.
pub fn lambda_lift(
    core: &mut CoreArena,
    core_symbols: &mut CoreSymbolTable,
    types: &mut TypeArena,
    interner: &mut Interner,
) {
    let Some(root) = core.root else {
        return;
    };

    // Collect the top-level chain and its global symbols.
    let mut chain = Vec::new();
    let mut current = Some(root);
    while let Some(id) = current {
        let CoreKind::Let { bind, body } = core.kind(id).clone() else {
            break;
        };
        chain.push(bind);
        current = body;
    }
    let mut globals = FxHashSet::default();
    for (symbol_id, symbol) in core_symbols.iter() {
        if symbol.is_primitive || symbol.is_constructor {
            globals.insert(symbol_id);
        }
    }
    for &bind in &chain {
        collect_top_symbols(core, bind, &mut globals);
    }

    let mut pass = LambdaLift {
        core,
        core_symbols,
        types,
        interner,
        globals,
        lifted: Vec::new(),
        fresh_counter: 0,
    };

    let mut new_chain: Vec<CoreId> = Vec::new();
    for bind in chain {
        pass.lift_top_bind(bind);
        new_chain.append(&mut pass.lifted);
        new_chain.push(bind);
    }

    // Rebuild the root chain.
    let mut rebuilt: Option<CoreId> = None;
    for &bind in new_chain.iter().rev() {
        let ty = pass.core.ty(bind);
        rebuilt = Some(pass.core.create_let(bind, rebuilt, ty));
    }
    pass.core.root = rebuilt;
}

fn collect_top_symbols(core: &CoreArena, bind: CoreId, out: &mut FxHashSet<CoreSymbolId>) {
    match core.kind(bind) {
        CoreKind::Bind { symbol, .. } => {
            out.insert(*symbol);
        }
        CoreKind::BindRec { binds } => {
            for &inner in binds {
                collect_top_symbols(core, inner, out);
            }
        }
        CoreKind::DataDecl { symbol, cons } => {
            out.insert(*symbol);
            for &con in cons {
                if let CoreKind::DataCon { symbol, .. } = core.kind(con) {
                    out.insert(*symbol);
                }
            }
        }
        _ => {}
    }
}

impl<'a> LambdaLift<'a> {
    fn lift_top_bind(&mut self, bind: CoreId) {
        match self.core.kind(bind).clone() {
            CoreKind::Bind { expr, initializer, .. } => {
                // The leading lambda chain stays; only nested lambdas
                // lift.
                let mut body = expr;
                while let CoreKind::Lam { body: inner, .. } = self.core.kind(body).clone() {
                    body = inner;
                }
                self.lift_in(body);
                if let Some(initializer) = initializer {
                    self.lift_in(initializer);
                }
            }
            CoreKind::BindRec { binds } => {
                for inner in binds {
                    self.lift_top_bind(inner);
                }
            }
            _ => {}
        }
    }

    /// Rewrite every nested lambda in the subtree rooted at `id`.
    fn lift_in(&mut self, id: CoreId) {
        if let CoreKind::Lam { .. } = self.core.kind(id) {
            // A whole lambda chain lifts as one unit; only lambdas past
            // the chain lift separately (innermost first).
            let mut body = id;
            while let CoreKind::Lam { body: inner, .. } = self.core.kind(body).clone() {
                body = inner;
            }
            self.lift_in(body);
            self.lift_lambda(id);
            return;
        }
        for child in self.core.children(id) {
            self.lift_in(child);
        }
    }

    /// Hoist the lambda at `id` and overwrite the node in place with the
    /// application of the lifted function to its captures.
    fn lift_lambda(&mut self, id: CoreId) {
        // Formal parameters of the whole lambda chain.
        let mut params = FxHashSet::default();
        let mut body = id;
        while let CoreKind::Lam { arg, body: inner } = self.core.kind(body).clone() {
            if let CoreKind::Var { symbol } = self.core.kind(arg) {
                params.insert(*symbol);
            }
            body = inner;
        }

        // Free variables: used below, bound neither by the chain nor
        // locally, and not global.
        let mut free: Vec<CoreSymbolId> = Vec::new();
        let mut bound = params.clone();
        self.free_vars(body, &mut bound, &mut free);

        self.fresh_counter += 1;
        let name = self
            .interner
            .intern(&format!("lifted@{}", self.fresh_counter));

        // Lifted type: free-var types prepended to the lambda type.
        let lam_ty = self.core.ty(id);
        let lifted_ty = lam_ty.map(|lam_ty| {
            let mut ty = lam_ty;
            for &free_sym in free.iter().rev() {
                let free_ty = self
                    .core_symbols
                    .get(free_sym)
                    .ty
                    .unwrap_or_else(|| self.fresh_ty());
                ty = self.types.mk_fun(free_ty, ty);
            }
            ty
        });

        let mut lifted_symbol = CoreAstSymbol::new(name, lifted_ty);
        lifted_symbol.arity = free.len() + params.len();
        let lifted_symbol = self.core_symbols.insert(lifted_symbol);
        self.globals.insert(lifted_symbol);

        // Move the lambda into a fresh node; the original id becomes the
        // call site.
        let lam_kind = self.core.kind(id).clone();
        let moved = self.core.alloc(lam_kind, lam_ty);

        // Wrap the moved lambda with one lambda per free variable.
        let mut lifted_expr = moved;
        for &free_sym in free.iter().rev() {
            let free_ty = self.core_symbols.get(free_sym).ty;
            let arg = self.core.create_var(free_sym, free_ty);
            let inner_ty = self.core.ty(lifted_expr);
            let lam_ty = match (free_ty, inner_ty) {
                (Some(f), Some(i)) => Some(self.types.mk_fun(f, i)),
                _ => None,
            };
            lifted_expr = self.core.create_lam(arg, lifted_expr, lam_ty);
        }
        let bind = self
            .core
            .create_bind(lifted_symbol, lifted_expr, None, lifted_ty);
        self.core_symbols.get_mut(lifted_symbol).ast = Some(bind);
        self.lifted.push(bind);

        // Call site: lifted applied to the captured values.
        let lifted_var = self.core.create_var(lifted_symbol, lifted_ty);
        let mut call = lifted_var;
        let mut remaining_ty = lifted_ty;
        for &free_sym in &free {
            let free_ty = self.core_symbols.get(free_sym).ty;
            let arg = self.core.create_var(free_sym, free_ty);
            remaining_ty = remaining_ty.and_then(|ty| {
                let ty = self.types.find(ty);
                match self.types.term(ty) {
                    TypeTerm::Fun { result, .. } => Some(*result),
                    _ => None,
                }
            });
            call = self.core.create_app(call, arg, remaining_ty);
        }
        let call_kind = self.core.kind(call).clone();
        let call_ty = self.core.ty(call);
        *self.core.get_mut(id) = crate::core::CoreAst {
            kind: call_kind,
            ty: call_ty.or(lam_ty),
        };
    }

    fn fresh_ty(&mut self) -> TypeId {
        self.types.mk_var(None, None)
    }

    fn free_vars(
        &self,
        id: CoreId,
        bound: &mut FxHashSet<CoreSymbolId>,
        out: &mut Vec<CoreSymbolId>,
    ) {
        match self.core.kind(id).clone() {
            CoreKind::Var { symbol } => {
                let sym = self.core_symbols.get(symbol);
                if !bound.contains(&symbol)
                    && !self.globals.contains(&symbol)
                    && !sym.is_constructor
                    && !sym.is_primitive
                    && !out.contains(&symbol)
                {
                    out.push(symbol);
                }
            }
            CoreKind::Lam { arg, body } => {
                if let CoreKind::Var { symbol } = self.core.kind(arg) {
                    bound.insert(*symbol);
                }
                self.free_vars(body, bound, out);
            }
            CoreKind::Let { bind, body } => {
                if let CoreKind::Bind { symbol, .. } = self.core.kind(bind) {
                    bound.insert(*symbol);
                }
                self.free_vars(bind, bound, out);
                if let Some(body) = body {
                    self.free_vars(body, bound, out);
                }
            }
            CoreKind::Bind {
                expr, initializer, ..
            } => {
                self.free_vars(expr, bound, out);
                if let Some(initializer) = initializer {
                    self.free_vars(initializer, bound, out);
                }
            }
            CoreKind::BindRec { binds } => {
                for &inner in &binds {
                    if let CoreKind::Bind { symbol, .. } = self.core.kind(inner) {
                        bound.insert(*symbol);
                    }
                }
                for inner in binds {
                    self.free_vars(inner, bound, out);
                }
            }
            CoreKind::Case { expr, alts } => {
                self.free_vars(expr, bound, out);
                for alt in alts {
                    let CoreKind::CaseAlt { pat, body } = self.core.kind(alt).clone() else {
                        continue;
                    };
                    if let Some(pat) = pat {
                        self.bind_pattern_vars(pat, bound);
                    }
                    self.free_vars(body, bound, out);
                }
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
                        self.bind_pattern_vars(index_pat, bound);
                        self.free_vars(range_init, bound, out);
                    }
                    LoopKind::While { condition } => {
                        self.free_vars(condition, bound, out);
                    }
                }
                self.bind_pattern_vars(value_pat, bound);
                self.free_vars(value_init, bound, out);
                self.free_vars(body, bound, out);
            }
            _ => {
                for child in self.core.children(id) {
                    self.free_vars(child, bound, out);
                }
            }
        }
    }

    fn bind_pattern_vars(&self, pat: CoreId, bound: &mut FxHashSet<CoreSymbolId>) {
        match self.core.kind(pat).clone() {
            CoreKind::Var { symbol } => {
                if !self.core_symbols.get(symbol).is_constructor {
                    bound.insert(symbol);
                }
            }
            CoreKind::App { function, argument } => {
                self.bind_pattern_vars(function, bound);
                self.bind_pattern_vars(argument, bound);
            }
            _ => {}
        }
    }
}
