//! State analysis and deep-copy synthesis (phase K).
//!
//! Bottom-up classification of every binding into the four-valued state
//! lattice (`Constant < Pointwise < Stateful < Poly`, merged by max):
//! recursive initialized values, loops, and anything transitively
//! depending on them are `Stateful`; lambda-bound variables and data
//! constructors are `Poly`; a use of a stateful zero-arity binding is
//! itself only `Pointwise`.
//!
//! Alongside classification:
//! - polymorphic type constructors surviving into Core are specialized
//!   into mangled monomorphic declarations (`Maybe<Int>`), one per
//!   structural type, inserted at the top of the tree; the abstract
//!   `Index` type collapses to `UInt`;
//! - every recursive initialized binding's expression is wrapped in a
//!   synthesized deep-copy routine for its stored type (per-field copy
//!   case for products, N-alternative case for sums, identity for
//!   primitives and enums, an index loop for arrays), so successive
//!   iterations never alias prior state.

use rustc_hash::FxHashMap;

use crate::base::{Interner, SourceSpan};
use crate::core::{CoreArena, CoreAstSymbol, CoreId, CoreKind, CoreLiteral, CoreSymbolId, CoreSymbolTable, LoopKind};
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::{AstSymbol, StateType, SymbolId, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::unify::TypeEnv;
use crate::types::{TypeArena, TypeId, TypeTerm};

struct StateAnalysis<'a> {
    core: &'a mut CoreArena,
    core_symbols: &'a mut CoreSymbolTable,
    types: &'a mut TypeArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
    classes: &'a ClassTable,
    base: &'a BaseModule,
    interner: &'a mut Interner,
    /// Mangled structural type -> specialized front-end type symbol.
    specialized: FxHashMap<String, SymbolId>,
    /// Type symbol -> synthesized copy routine (None = identity).
    deep_copy_fns: FxHashMap<SymbolId, Option<CoreSymbolId>>,
    /// New top-level declarations (specialized types, copy routines).
    new_lets: Vec<CoreId>,
    fresh_counter: u32,
}

/// Classify every binding and synthesize deep copies for recursive
/// initialized values.
#[allow(clippy::too_many_arguments)]
pub fn state_analysis(
    core: &mut CoreArena,
    core_symbols: &mut CoreSymbolTable,
    types: &mut TypeArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
    classes: &ClassTable,
    base: &BaseModule,
    interner: &mut Interner,
) {
    let Some(root) = core.root else {
        return;
    };
    let mut pass = StateAnalysis {
        core,
        core_symbols,
        types,
        symbols,
        scopes,
        classes,
        base,
        interner,
        specialized: FxHashMap::default(),
        deep_copy_fns: FxHashMap::default(),
        new_lets: Vec::new(),
        fresh_counter: 0,
    };

    pass.specialize_tree(root);
    pass.go(root, None);

    // Insert the synthesized declarations at the top of the tree.
    let mut new_root = pass.core.root;
    for &decl in pass.new_lets.iter().rev() {
        let ty = pass.core.ty(decl);
        new_root = Some(pass.core.create_let(decl, new_root, ty));
    }
    pass.core.root = new_root;
}

impl<'a> StateAnalysis<'a> {
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

    // ==================================================================
    // Type specialization
    // ==================================================================

    fn specialize_tree(&mut self, id: CoreId) {
        if let Some(ty) = self.core.ty(id) {
            let specialized = self.specialize_type(ty);
            if specialized != ty {
                self.core.set_ty(id, specialized);
            }
        }
        match self.core.kind(id).clone() {
            CoreKind::Var { symbol }
            | CoreKind::Bind { symbol, .. }
            | CoreKind::DataDecl { symbol, .. } => {
                if let Some(sym_ty) = self.core_symbols.get(symbol).ty {
                    let specialized = self.specialize_type(sym_ty);
                    if specialized != sym_ty {
                        self.core_symbols.get_mut(symbol).ty = Some(specialized);
                    }
                }
            }
            _ => {}
        }
        for child in self.core.children(id) {
            self.specialize_tree(child);
        }
    }

    /// Monomorphize a surviving polymorphic type constructor application
    /// into a dedicated nullary type, interned per structural type.
    fn specialize_type(&mut self, ty: TypeId) -> TypeId {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Con { symbol, args } => {
                if args.is_empty() {
                    // `Index` collapses to the primitive unsigned type.
                    if symbol == self.base.index_type {
                        return self.symbols.get(self.base.uint_type).ty.expect("typed");
                    }
                    return ty;
                }
                // Arrays stay primitively polymorphic; their element
                // specializes.
                if symbol == self.base.array_type {
                    let new_args: Vec<TypeId> =
                        args.iter().map(|&a| self.specialize_type(a)).collect();
                    if new_args == args {
                        return ty;
                    }
                    let new_ty = self.types.mk_con(symbol, new_args);
                    self.types.get_mut(new_ty).kind_of = Some(self.base.star_kind_ty);
                    return new_ty;
                }
                if self.types.is_polymorphic(ty) {
                    return ty;
                }
                let mangled = self.types.mangled_string(ty, self.symbols);
                if let Some(&specialized) = self.specialized.get(&mangled) {
                    return self.symbols.get(specialized).ty.expect("specialized typed");
                }
                self.specialize_data_type(symbol, ty, mangled)
            }
            TypeTerm::Fun { arg, result } => {
                let new_arg = self.specialize_type(arg);
                let new_result = self.specialize_type(result);
                if new_arg == arg && new_result == result {
                    return ty;
                }
                let new_ty = self.types.mk_fun(new_arg, new_result);
                self.types.get_mut(new_ty).kind_of = Some(self.base.star_kind_ty);
                new_ty
            }
            TypeTerm::App { .. } => {
                let uncurried = self.types.uncurry_app(ty);
                if uncurried == ty {
                    return ty;
                }
                self.specialize_type(uncurried)
            }
            TypeTerm::Var(_) | TypeTerm::For { .. } | TypeTerm::Nat(_) | TypeTerm::Sym(_) => ty,
        }
    }

    /// Synthesize `T<args>` as a fresh nullary data type cloned from the
    /// polymorphic declaration, inserted at the top of the tree.
    fn specialize_data_type(
        &mut self,
        symbol: SymbolId,
        applied: TypeId,
        mangled: String,
    ) -> TypeId {
        let module_name = self.symbols.get(symbol).module_name.clone();
        let name = self.interner.intern(&mangled);
        let specialized_symbol = self.symbols.insert(AstSymbol::new(
            name.clone(),
            name.clone(),
            module_name.clone(),
            SourceSpan::NULL,
        ));
        let specialized_ty = self.types.mk_con(specialized_symbol, Vec::new());
        self.types.get_mut(specialized_ty).kind_of = Some(self.base.star_kind_ty);
        {
            let original = self.symbols.get(symbol).clone();
            let sym = self.symbols.get_mut(specialized_symbol);
            sym.ty = Some(specialized_ty);
            sym.is_enum = original.is_enum;
            sym.is_wrapper = original.is_wrapper;
            sym.is_primitive = original.is_primitive;
            sym.is_recursive = original.is_recursive;
        }
        self.specialized.insert(mangled.clone(), specialized_symbol);

        // Clone the polymorphic Core declaration's constructors at the
        // concrete argument types.
        let poly_core_symbol = self
            .core_symbols
            .iter()
            .find(|(_, s)| s.ast_symbol == Some(symbol))
            .map(|(id, _)| id);
        let mut cons = Vec::new();
        if let Some(poly_core_symbol) = poly_core_symbol {
            if let Some(poly_decl) = self.core_symbols.get(poly_core_symbol).ast {
                if let CoreKind::DataDecl { cons: poly_cons, .. } =
                    self.core.kind(poly_decl).clone()
                {
                    let suffix_start = mangled.find('<').unwrap_or(mangled.len());
                    let suffix = mangled[suffix_start..].to_string();
                    for poly_con in poly_cons {
                        let CoreKind::DataCon {
                            symbol: poly_con_symbol,
                            con_ty: poly_con_ty,
                            ..
                        } = self.core.kind(poly_con).clone()
                        else {
                            continue;
                        };
                        // Instantiate the constructor and pin its result
                        // to the applied type.
                        let (inst, _) = self.env().instantiate(poly_con_ty, None);
                        let result = self.types.fully_applied_result(inst);
                        let _ = self
                            .env()
                            .unify(result, applied, None, SourceSpan::NULL);
                        let mut spec_con_ty = self.types.deep_copy(inst);
                        spec_con_ty = self.replace_result_with(spec_con_ty, specialized_ty);
                        spec_con_ty = self.specialize_type(spec_con_ty);

                        let poly_name =
                            self.core_symbols.get(poly_con_symbol).name.clone();
                        let con_name = self
                            .interner
                            .intern(&format!("{}{}", poly_name.as_str(), suffix));
                        let con_ast_symbol = self.symbols.insert(AstSymbol::new(
                            con_name.clone(),
                            con_name.clone(),
                            module_name.clone(),
                            SourceSpan::NULL,
                        ));
                        {
                            let original = self.core_symbols.get(poly_con_symbol);
                            let con_num = original.con_num;
                            let arity = original.arity;
                            let is_enum = original.is_enum;
                            let sym = self.symbols.get_mut(con_ast_symbol);
                            sym.ty = Some(spec_con_ty);
                            sym.is_constructor = true;
                            sym.con_num = con_num;
                            sym.arity = Some(arity);
                            sym.is_enum = is_enum;
                        }
                        let mut spec_core_con = CoreAstSymbol::new(con_name, Some(spec_con_ty));
                        spec_core_con.ast_symbol = Some(con_ast_symbol);
                        spec_core_con.is_constructor = true;
                        spec_core_con.con_num = self.core_symbols.get(poly_con_symbol).con_num;
                        spec_core_con.arity = self.core_symbols.get(poly_con_symbol).arity;
                        spec_core_con.is_enum = self.core_symbols.get(poly_con_symbol).is_enum;
                        spec_core_con.state_type = StateType::Poly;
                        let spec_core_con = self.core_symbols.insert(spec_core_con);
                        let con_node = self.core.create_data_con(
                            spec_core_con,
                            spec_con_ty,
                            specialized_ty,
                        );
                        self.core_symbols.get_mut(spec_core_con).ast = Some(con_node);
                        cons.push(con_node);
                    }
                }
            }
        }

        let mut spec_core_type = CoreAstSymbol::new(name, Some(specialized_ty));
        spec_core_type.ast_symbol = Some(specialized_symbol);
        spec_core_type.is_enum = self.symbols.get(specialized_symbol).is_enum;
        let spec_core_type = self.core_symbols.insert(spec_core_type);
        let decl = self
            .core
            .create_data_decl(spec_core_type, cons, Some(specialized_ty));
        self.core_symbols.get_mut(spec_core_type).ast = Some(decl);
        self.new_lets.push(decl);
        specialized_ty
    }

    fn replace_result_with(&mut self, ty: TypeId, new_result: TypeId) -> TypeId {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Fun { arg, result } => {
                let new_inner = self.replace_result_with(result, new_result);
                let new_ty = self.types.mk_fun(arg, new_inner);
                self.types.get_mut(new_ty).kind_of = Some(self.base.star_kind_ty);
                new_ty
            }
            _ => new_result,
        }
    }

    // ==================================================================
    // Classification
    // ==================================================================

    fn go(&mut self, id: CoreId, outer: Option<CoreSymbolId>) -> StateType {
        match self.core.kind(id).clone() {
            CoreKind::Var { symbol } => {
                // A use of an initialized binding is stateful wherever it
                // appears.
                let initialized = self
                    .core_symbols
                    .get(symbol)
                    .ast
                    .map(|bind| {
                        matches!(
                            self.core.kind(bind),
                            CoreKind::Bind {
                                initializer: Some(_),
                                ..
                            }
                        )
                    })
                    .unwrap_or(false);
                if initialized {
                    self.core_symbols.get_mut(symbol).state_type = StateType::Stateful;
                }
                let sym = self.core_symbols.get_mut(symbol);
                if sym.is_constructor {
                    // Nullary constructors are constant values; the
                    // constructor functions take their state from their
                    // arguments.
                    if sym.arity == 0 {
                        return StateType::Constant;
                    }
                    sym.state_type = StateType::Poly;
                    return StateType::Poly;
                }
                let state = sym.state_type;
                // Using a stateful zero-arity binding is pointwise: the
                // state lives with the definition.
                if state == StateType::Stateful && sym.arity == 0 {
                    StateType::Pointwise
                } else {
                    state
                }
            }

            CoreKind::Lit { value } => {
                let mut state = StateType::Constant;
                if let CoreLiteral::Array(elements) = value {
                    for element in elements {
                        state = state.merge(self.go(element, outer));
                    }
                }
                state
            }

            CoreKind::Lam { arg, body } => {
                if let CoreKind::Var { symbol } = self.core.kind(arg) {
                    self.core_symbols.get_mut(*symbol).state_type = StateType::Poly;
                }
                self.go(body, outer)
            }

            CoreKind::Let { bind, body } => {
                let bind_state = self.go(bind, outer);
                match body {
                    Some(body) => {
                        let body_state = self.go(body, outer);
                        bind_state.merge(body_state)
                    }
                    None => StateType::Constant,
                }
            }

            CoreKind::Bind { .. } => self.go_bind(id, outer),

            CoreKind::BindRec { binds } => {
                let mut state = StateType::Constant;
                for bind in binds {
                    state = state.merge(self.go(bind, outer));
                }
                state
            }

            CoreKind::Case { expr, alts } => {
                let mut state = self.go(expr, outer);
                for alt in alts {
                    let CoreKind::CaseAlt { pat, body } = self.core.kind(alt).clone() else {
                        continue;
                    };
                    if let Some(pat) = pat {
                        self.pat_go(pat);
                    }
                    state = state.merge(self.go(body, outer));
                }
                state
            }

            CoreKind::CaseAlt { pat, body } => {
                if let Some(pat) = pat {
                    self.pat_go(pat);
                }
                self.go(body, outer)
            }

            CoreKind::App { function, argument } => {
                let args_state = self.go(argument, outer);
                let fn_state = self.go(function, outer);
                // Poly functions take their state from their arguments.
                if fn_state == StateType::Poly {
                    args_state
                } else {
                    fn_state.merge(args_state)
                }
            }

            CoreKind::DataDecl { .. } | CoreKind::DataCon { .. } => StateType::Constant,

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
                        self.pat_go(index_pat);
                        self.go(range_init, outer);
                    }
                    LoopKind::While { condition } => {
                        self.go(condition, outer);
                    }
                }
                self.pat_go(value_pat);
                self.go(value_init, outer);
                self.go(body, outer);
                // While-loop accumulators feed back between iterations
                // and must never alias prior state.
                if matches!(self.core.kind(id), CoreKind::Loop { loop_kind: LoopKind::While { .. }, .. }) {
                    let copied = self.maybe_deep_copy(body);
                    if copied != body {
                        if let CoreKind::Loop { body, .. } = &mut self.core.get_mut(id).kind {
                            *body = copied;
                        }
                    }
                }
                StateType::Stateful
            }
        }
    }

    fn go_bind(&mut self, id: CoreId, outer: Option<CoreSymbolId>) -> StateType {
        let CoreKind::Bind {
            symbol,
            expr,
            initializer,
        } = self.core.kind(id).clone()
        else {
            unreachable!("bind expected");
        };
        self.core_symbols.get_mut(symbol).outer = outer;
        if let Some(initializer) = initializer {
            // A recursive initialized value requires persistent storage,
            // and successive iterations must never alias prior state.
            self.core_symbols.get_mut(symbol).state_type = StateType::Stateful;
            self.go(initializer, Some(symbol));
            self.set_outer_rec_stateful(symbol);
            let expr_state = self.go(expr, Some(symbol));
            let merged = self
                .core_symbols
                .get(symbol)
                .state_type
                .merge(expr_state);
            self.core_symbols.get_mut(symbol).state_type = merged;
            let copied = self.maybe_deep_copy(expr);
            if copied != expr {
                if let CoreKind::Bind { expr, .. } = &mut self.core.get_mut(id).kind {
                    *expr = copied;
                }
            }
        } else {
            let expr_state = self.go(expr, Some(symbol));
            let merged = self
                .core_symbols
                .get(symbol)
                .state_type
                .merge(expr_state);
            self.core_symbols.get_mut(symbol).state_type = merged;
        }
        self.core_symbols.get(symbol).state_type
    }

    /// Statefulness flows outward through the lexical binder chain. A
    /// top-level binding stores its state in a global slot and is itself
    /// only pointwise.
    fn set_outer_rec_stateful(&mut self, symbol: CoreSymbolId) {
        if self.core_symbols.get(symbol).outer.is_none() {
            self.core_symbols.get_mut(symbol).state_type = StateType::Pointwise;
            return;
        }
        let mut current = Some(symbol);
        while let Some(sym) = current {
            self.core_symbols.get_mut(sym).state_type = StateType::Stateful;
            current = self.core_symbols.get(sym).outer;
        }
    }

    fn pat_go(&mut self, pat: CoreId) {
        match self.core.kind(pat).clone() {
            CoreKind::Var { symbol } => {
                if !self.core_symbols.get(symbol).is_constructor {
                    self.core_symbols.get_mut(symbol).state_type = StateType::Poly;
                }
            }
            CoreKind::App { function, argument } => {
                self.pat_go(function);
                self.pat_go(argument);
            }
            _ => {}
        }
    }

    // ==================================================================
    // Deep-copy synthesis
    // ==================================================================

    /// Wrap an expression in the copy routine of its type; identity when
    /// no copying is required.
    fn maybe_deep_copy(&mut self, expr: CoreId) -> CoreId {
        let Some(ty) = self.core.ty(expr) else {
            return expr;
        };
        let ty = self.types.find(ty);
        let TypeTerm::Con { symbol, .. } = self.types.term(ty).clone() else {
            return expr;
        };
        if symbol == self.base.array_type {
            return self.deep_copy_array(expr, ty);
        }
        let copy_fn = self.deep_copy_fn_for(symbol);
        match copy_fn {
            Some(copy_fn) => {
                let fn_ty = self.core_symbols.get(copy_fn).ty;
                let fn_var = self.core.create_var(copy_fn, fn_ty);
                self.core.create_app(fn_var, expr, Some(ty))
            }
            None => expr,
        }
    }

    /// The copy routine for a data type: a case reconstructing the value
    /// with `copy` applied to each field (one alternative per
    /// constructor). Primitives and enums copy by value.
    fn deep_copy_fn_for(&mut self, type_symbol: SymbolId) -> Option<CoreSymbolId> {
        if let Some(&cached) = self.deep_copy_fns.get(&type_symbol) {
            return cached;
        }
        // Reserve the slot: recursive types reuse the routine being
        // built.
        self.deep_copy_fns.insert(type_symbol, None);

        let sym = self.symbols.get(type_symbol);
        if sym.is_primitive || sym.is_enum {
            return None;
        }
        let data_ty = sym.ty?;

        let core_type_symbol = self
            .core_symbols
            .iter()
            .find(|(_, s)| s.ast_symbol == Some(type_symbol))
            .map(|(id, _)| id)?;
        let decl = self.core_symbols.get(core_type_symbol).ast?;
        let CoreKind::DataDecl { cons, .. } = self.core.kind(decl).clone() else {
            return None;
        };
        if cons.is_empty() {
            return None;
        }

        // Pre-register the routine so field copies of the same type
        // resolve to it.
        let fn_ty = self.types.mk_fun(data_ty, data_ty);
        self.types.get_mut(fn_ty).kind_of = Some(self.base.star_kind_ty);
        let copy_symbol = self.fresh_symbol("deepCopy", Some(fn_ty));
        {
            let sym = self.core_symbols.get_mut(copy_symbol);
            sym.arity = 1;
            sym.is_deep_copy_fn = true;
            sym.state_type = StateType::Pointwise;
        }
        self.deep_copy_fns.insert(type_symbol, Some(copy_symbol));

        let mut alts = Vec::with_capacity(cons.len());
        for con in cons {
            let CoreKind::DataCon {
                symbol: con_symbol,
                con_ty,
                ..
            } = self.core.kind(con).clone()
            else {
                continue;
            };
            let stripped = self.types.strip_for_all(con_ty);
            let field_tys = self.types.fun_args(stripped);
            let mut pat = self.core.create_var(con_symbol, Some(stripped));
            let mut rebuild = self.core.create_var(con_symbol, Some(stripped));
            for field_ty in field_tys {
                let field_symbol = self.fresh_symbol("p", Some(field_ty));
                let field_pat = self.core.create_var(field_symbol, Some(field_ty));
                let field_use = self.core.create_var(field_symbol, Some(field_ty));
                pat = self.core.create_app(pat, field_pat, None);
                let copied_field = self.maybe_deep_copy(field_use);
                rebuild = self.core.create_app(rebuild, copied_field, None);
            }
            self.core.set_ty(rebuild, data_ty);
            alts.push(self.core.create_case_alt(Some(pat), rebuild, Some(data_ty)));
        }

        let arg_symbol = self.fresh_symbol("x", Some(data_ty));
        let arg_var = self.core.create_var(arg_symbol, Some(data_ty));
        let scrutinee = self.core.create_var(arg_symbol, Some(data_ty));
        let case = self.core.create_case(scrutinee, alts, Some(data_ty));
        let lam = self.core.create_lam(arg_var, case, Some(fn_ty));
        let bind = self.core.create_bind(copy_symbol, lam, None, Some(fn_ty));
        self.core_symbols.get_mut(copy_symbol).ast = Some(bind);
        self.new_lets.push(bind);
        Some(copy_symbol)
    }

    /// Arrays copy slot by slot: a for loop over the indices writing a
    /// deep copy of each element into a fresh array.
    fn deep_copy_array(&mut self, expr: CoreId, array_ty: TypeId) -> CoreId {
        let TypeTerm::Con { args, .. } = self.types.term(array_ty).clone() else {
            return expr;
        };
        let (Some(&len_ty), Some(&elem_ty)) = (args.first(), args.get(1)) else {
            return expr;
        };
        let max_loops = match self.types.term(self.types.find_const(len_ty)) {
            TypeTerm::Nat(n) => *n,
            _ => 0,
        };

        let index_ty = self.symbols.get(self.base.uint_type).ty;
        let index_symbol = self.fresh_symbol("i", index_ty);
        let acc_symbol = self.fresh_symbol("a", Some(array_ty));
        let index_pat = self.core.create_var(index_symbol, index_ty);
        let value_pat = self.core.create_var(acc_symbol, Some(array_ty));

        // unsafeEmptyArray ()
        let empty_fn = {
            let sym = self.core_symbol_for(self.base.unsafe_empty_array);
            let ty = self.symbols.get(self.base.unsafe_empty_array).ty;
            self.core.create_var(sym, ty)
        };
        let unit_con = {
            let sym = self.core_symbol_for(self.base.unit_con);
            let ty = self.symbols.get(self.base.unit_type).ty;
            self.core.create_var(sym, ty)
        };
        let empty_array = self.core.create_app(empty_fn, unit_con, Some(array_ty));

        // writeArray i (copy (readArray i src)) acc
        let read_fn = {
            let sym = self.core_symbol_for(self.base.read_array);
            let ty = self.symbols.get(self.base.read_array).ty;
            self.core.create_var(sym, ty)
        };
        let index_use = self.core.create_var(index_symbol, index_ty);
        let read_partial = self.core.create_app(read_fn, index_use, None);
        let read = self.core.create_app(read_partial, expr, Some(elem_ty));
        let copied = self.maybe_deep_copy(read);

        let write_fn = {
            let sym = self.core_symbol_for(self.base.write_array);
            let ty = self.symbols.get(self.base.write_array).ty;
            self.core.create_var(sym, ty)
        };
        let index_use2 = self.core.create_var(index_symbol, index_ty);
        let acc_use = self.core.create_var(acc_symbol, Some(array_ty));
        let write_partial = self.core.create_app(write_fn, index_use2, None);
        let write_partial = self.core.create_app(write_partial, copied, None);
        let write = self.core.create_app(write_partial, acc_use, Some(array_ty));

        let range_init = self.core.deep_copy(expr);
        self.core.alloc(
            CoreKind::Loop {
                loop_kind: LoopKind::For {
                    index_pat,
                    range_init,
                    max_loops,
                },
                value_pat,
                value_init: empty_array,
                body: write,
            },
            Some(array_ty),
        )
    }

    /// Core symbol for a base binding, creating the mirror on first use.
    fn core_symbol_for(&mut self, symbol: SymbolId) -> CoreSymbolId {
        if let Some((id, _)) = self
            .core_symbols
            .iter()
            .find(|(_, s)| s.ast_symbol == Some(symbol))
        {
            return id;
        }
        let source = self.symbols.get(symbol);
        let mut core_sym = CoreAstSymbol::new(source.name.clone(), source.ty);
        core_sym.source_name = source.source_name.clone();
        core_sym.arity = source.arity.unwrap_or(0);
        core_sym.is_primitive = source.is_primitive;
        core_sym.is_constructor = source.is_constructor;
        core_sym.is_enum = source.is_enum;
        core_sym.state_type = source.state_type;
        let mut with_back_ref = core_sym;
        with_back_ref.ast_symbol = Some(symbol);
        self.core_symbols.insert(with_back_ref)
    }
}
