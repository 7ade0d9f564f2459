//! Unification, instantiation, generalization, and defaulting.
//!
//! Unification is union-find over type variables with an occurs check.
//! Rigid variables (from user signatures) are never bound. Binding a flex
//! variable against a concrete head checks the variable's class context
//! against the head's instance list; a context that cannot be satisfied is
//! a missing-instance error.

use rustc_hash::FxHashMap;

use crate::base::{Interner, SourceSpan};
use crate::error::{CompileError, CompileErrorKind, Result};
use crate::syntax::ast::InstSub;
use crate::syntax::scope::{ScopeId, ScopeTable};
use crate::syntax::symbol::{SymbolId, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::kind::{kind_unify, occurs};
use crate::types::{TypeArena, TypeId, TypeTerm};

/// Shared context for type-level operations.
pub struct TypeEnv<'a> {
    pub types: &'a mut TypeArena,
    pub symbols: &'a mut SymbolTable,
    pub scopes: &'a ScopeTable,
    pub classes: &'a ClassTable,
    pub base: &'a BaseModule,
    pub interner: &'a mut Interner,
}

impl<'a> TypeEnv<'a> {
    // ------------------------------------------------------------------
    // Scope depth
    // ------------------------------------------------------------------

    /// A variable bound in an enclosing scope must not be generalized or
    /// re-bound toward the inner scope.
    fn is_bound_in_scope(&self, ty: TypeId, scope: Option<ScopeId>) -> bool {
        let ty = self.types.find_const(ty);
        let TypeTerm::Var(var) = self.types.term(ty) else {
            return false;
        };
        match (var.scope, scope) {
            (Some(var_scope), Some(scope)) => {
                var_scope != scope && self.scopes.is_within(scope, var_scope)
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Unification
    // ------------------------------------------------------------------

    fn mismatched(&self, left: TypeId, right: TypeId, span: SourceSpan) -> CompileError {
        CompileError::new(
            CompileErrorKind::MismatchedType {
                left: self.types.display(left, self.symbols),
                right: self.types.display(right, self.symbols),
            },
            span,
        )
    }

    fn rigid(&self, var: TypeId, ty: TypeId, span: SourceSpan) -> CompileError {
        CompileError::new(
            CompileErrorKind::RigidTypeVariable {
                var: self.types.display(var, self.symbols),
                ty: self.types.display(ty, self.symbols),
            },
            span,
        )
    }

    /// Check that `con_symbol` satisfies every class in `context`,
    /// consulting declared instances (super-class expansion happens at
    /// instance registration).
    fn check_context_instances(
        &self,
        context: &[SymbolId],
        con_symbol: SymbolId,
        span: SourceSpan,
    ) -> Result<()> {
        for &class_symbol in context {
            if self
                .classes
                .find_instance(class_symbol, con_symbol)
                .is_none()
            {
                return Err(CompileError::new(
                    CompileErrorKind::MissingInstance {
                        class: self
                            .symbols
                            .source_name(class_symbol)
                            .as_str()
                            .to_string(),
                        ty: self.symbols.source_name(con_symbol).as_str().to_string(),
                    },
                    span,
                ));
            }
        }
        Ok(())
    }

    /// Propagate a var's class context into the type it is being bound to.
    fn propagate_context(&mut self, context: &[SymbolId], to: TypeId, span: SourceSpan) -> Result<()> {
        if context.is_empty() {
            return Ok(());
        }
        let to = self.types.find(to);
        match self.types.term(to).clone() {
            TypeTerm::Var(_) => {
                match &mut self.types.get_mut(to).term {
                    TypeTerm::Var(var) => {
                        for &class in context {
                            if !var.context.contains(&class) {
                                var.context.push(class);
                            }
                        }
                    }
                    _ => unreachable!(),
                }
                Ok(())
            }
            TypeTerm::Con { symbol, .. } => self.check_context_instances(context, symbol, span),
            // Arrow and applied types satisfy no class contexts here.
            _ => {
                let class = context[0];
                Err(CompileError::new(
                    CompileErrorKind::MissingInstance {
                        class: self.symbols.source_name(class).as_str().to_string(),
                        ty: self.types.display(to, self.symbols),
                    },
                    span,
                ))
            }
        }
    }

    fn bind_flex_var(&mut self, var: TypeId, to: TypeId, span: SourceSpan) -> Result<()> {
        let context = match self.types.term(var) {
            TypeTerm::Var(v) => v.context.clone(),
            _ => unreachable!("bind_flex_var on non-var"),
        };
        // Kinds must agree before the bind.
        if let (Some(k1), Some(k2)) = (self.types.get(var).kind_of, self.types.get(to).kind_of) {
            kind_unify(self.types, self.symbols, k1, k2, span)?;
        }
        self.propagate_context(&context, to, span)?;
        match &mut self.types.get_mut(var).term {
            TypeTerm::Var(v) => v.bound = Some(to),
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Unify two types. On success every later `find` of either side
    /// yields the same representative.
    pub fn unify(
        &mut self,
        t1: TypeId,
        t2: TypeId,
        scope: Option<ScopeId>,
        span: SourceSpan,
    ) -> Result<()> {
        let t1 = self.types.find(t1);
        let t2 = self.types.find(t2);
        if t1 == t2 {
            return Ok(());
        }
        let term1 = self.types.term(t1).clone();
        let term2 = self.types.term(t2).clone();
        match (&term1, &term2) {
            (TypeTerm::Var(v1), TypeTerm::Var(v2)) => {
                if v1.is_rigid && v2.is_rigid {
                    return Err(self.rigid(t1, t2, span));
                }
                occurs(self.types, t1, t2, self.symbols, span)?;
                if v1.is_rigid {
                    self.bind_flex_var(t2, t1, span)
                } else if v2.is_rigid {
                    self.bind_flex_var(t1, t2, span)
                } else if self.is_bound_in_scope(t1, scope) {
                    self.bind_flex_var(t2, t1, span)
                } else {
                    self.bind_flex_var(t1, t2, span)
                }
            }
            (TypeTerm::Var(v1), _) => {
                if v1.is_rigid {
                    return Err(self.rigid(t1, t2, span));
                }
                occurs(self.types, t1, t2, self.symbols, span)?;
                self.bind_flex_var(t1, t2, span)
            }
            (_, TypeTerm::Var(v2)) => {
                if v2.is_rigid {
                    return Err(self.rigid(t2, t1, span));
                }
                occurs(self.types, t2, t1, self.symbols, span)?;
                self.bind_flex_var(t2, t1, span)
            }
            (
                TypeTerm::Fun { arg: a1, result: r1 },
                TypeTerm::Fun { arg: a2, result: r2 },
            ) => {
                self.unify(*a1, *a2, scope, span)?;
                self.unify(*r1, *r2, scope, span)
            }
            (TypeTerm::Con { symbol: s1, args: args1 }, TypeTerm::Con { symbol: s2, args: args2 }) => {
                if s1 != s2 || args1.len() != args2.len() {
                    return Err(self.mismatched(t1, t2, span));
                }
                for (&a1, &a2) in args1.iter().zip(args2.iter()) {
                    self.unify(a1, a2, scope, span)?;
                }
                Ok(())
            }
            (TypeTerm::App { .. }, TypeTerm::Con { .. }) => {
                // Flatten the application when its head is concrete, or
                // expose the constructor's curried view when it is not.
                let uncurried = self.types.uncurry_app(t1);
                if uncurried != t1 {
                    return self.unify(uncurried, t2, scope, span);
                }
                match self.types.curry_con(t2) {
                    Some(curried) => self.unify(t1, curried, scope, span),
                    None => Err(self.mismatched(t1, t2, span)),
                }
            }
            (TypeTerm::Con { .. }, TypeTerm::App { .. }) => {
                let uncurried = self.types.uncurry_app(t2);
                if uncurried != t2 {
                    return self.unify(t1, uncurried, scope, span);
                }
                match self.types.curry_con(t1) {
                    Some(curried) => self.unify(curried, t2, scope, span),
                    None => Err(self.mismatched(t1, t2, span)),
                }
            }
            (
                TypeTerm::App { left: l1, right: r1 },
                TypeTerm::App { left: l2, right: r2 },
            ) => {
                self.unify(*l1, *l2, scope, span)?;
                self.unify(*r1, *r2, scope, span)
            }
            (TypeTerm::Nat(n1), TypeTerm::Nat(n2)) if n1 == n2 => Ok(()),
            (TypeTerm::Sym(s1), TypeTerm::Sym(s2)) if s1 == s2 => Ok(()),
            _ => Err(self.mismatched(t1, t2, span)),
        }
    }

    // ------------------------------------------------------------------
    // Instantiation and generalization
    // ------------------------------------------------------------------

    /// Replace variables by symbol, building fresh structure. Bound parts
    /// are chased first.
    pub fn replace_with_subs(&mut self, ty: TypeId, subs: &FxHashMap<SymbolId, TypeId>) -> TypeId {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Var(var) => match var.symbol.and_then(|s| subs.get(&s)) {
                Some(&replacement) => replacement,
                None => ty,
            },
            TypeTerm::App { left, right } => {
                let left = self.replace_with_subs(left, subs);
                let right = self.replace_with_subs(right, subs);
                let new_ty = self.types.mk_app(left, right);
                self.copy_annotations(ty, new_ty);
                new_ty
            }
            TypeTerm::Fun { arg, result } => {
                let arg = self.replace_with_subs(arg, subs);
                let result = self.replace_with_subs(result, subs);
                let new_ty = self.types.mk_fun(arg, result);
                self.copy_annotations(ty, new_ty);
                new_ty
            }
            TypeTerm::Con { symbol, args } => {
                let args = args
                    .iter()
                    .map(|&a| self.replace_with_subs(a, subs))
                    .collect();
                let new_ty = self.types.mk_con(symbol, args);
                self.copy_annotations(ty, new_ty);
                new_ty
            }
            TypeTerm::For { var, context, body } => {
                if subs.contains_key(&var) {
                    // The binder is being instantiated away.
                    self.replace_with_subs(body, subs)
                } else {
                    let body = self.replace_with_subs(body, subs);
                    self.types.mk_for_all(var, context, body)
                }
            }
            TypeTerm::Nat(_) | TypeTerm::Sym(_) => ty,
        }
    }

    fn copy_annotations(&mut self, from: TypeId, to: TypeId) {
        let kind_of = self.types.get(from).kind_of;
        let ownership = self.types.get(from).ownership;
        let target = self.types.get_mut(to);
        target.kind_of = kind_of;
        target.ownership = ownership;
    }

    /// Instantiate a (possibly quantified) type: each binder becomes a
    /// fresh flex var carrying the binder's class context. Returns the
    /// instantiated body and the substitution list for monomorphization.
    pub fn instantiate(
        &mut self,
        ty: TypeId,
        scope: Option<ScopeId>,
    ) -> (TypeId, Vec<InstSub>) {
        let mut subs_map = FxHashMap::default();
        let mut subs = Vec::new();
        let mut body = self.types.find(ty);
        while let TypeTerm::For { var, context, body: inner } = self.types.term(body).clone() {
            let var_kind = self
                .symbols
                .get(var)
                .ty
                .and_then(|t| self.types.get(self.types.find_const(t)).kind_of);
            let fresh = self.types.mk_var(None, scope);
            match &mut self.types.get_mut(fresh).term {
                TypeTerm::Var(v) => v.context = context.clone(),
                _ => unreachable!(),
            }
            self.types.get_mut(fresh).kind_of = var_kind;
            subs_map.insert(var, fresh);
            subs.push(InstSub {
                var_to_replace: var,
                new_type: fresh,
            });
            body = self.types.find(inner);
        }
        if subs_map.is_empty() {
            return (body, subs);
        }
        let instantiated = self.replace_with_subs(body, &subs_map);
        (instantiated, subs)
    }

    /// Generalize a monotype: close over free flex vars not bound in an
    /// enclosing scope, adding a `For` binder per variable with its
    /// residual context. Quantified variables turn rigid: the body is now
    /// checked against them, and only instantiation produces bindable
    /// copies. Free kind vars default to `Type`.
    pub fn generalize(&mut self, ty: TypeId, scope: Option<ScopeId>) -> TypeId {
        let mut free = Vec::new();
        self.collect_free_vars(ty, scope, &mut free);
        let mut result = ty;
        let module_name = self.base.module_name.clone();
        for &var_ty in free.iter().rev() {
            let (symbol, context) = match self.types.term(var_ty) {
                TypeTerm::Var(v) => (v.symbol, v.context.clone()),
                _ => continue,
            };
            let symbol = match symbol {
                Some(s) => s,
                None => {
                    // Name the anonymous var so the binder has a symbol.
                    let name = self.interner.intern(&format!("t{}", var_ty.index()));
                    let id = self.symbols.fresh(name, module_name.clone(), SourceSpan::NULL);
                    self.symbols.get_mut(id).ty = Some(var_ty);
                    match &mut self.types.get_mut(var_ty).term {
                        TypeTerm::Var(v) => v.symbol = Some(id),
                        _ => unreachable!(),
                    }
                    id
                }
            };
            match &mut self.types.get_mut(var_ty).term {
                TypeTerm::Var(v) => v.is_rigid = true,
                _ => unreachable!(),
            }
            result = self.types.mk_for_all(symbol, context, result);
        }
        result
    }

    /// Is the type still polymorphic once every flex variable that can
    /// default has defaulted? Rigid variables keep it polymorphic; a flex
    /// variable that will not default is an ambiguous-type-variable
    /// error.
    pub fn unambiguous_poly_check(
        &mut self,
        ty: TypeId,
        whole: TypeId,
        span: SourceSpan,
    ) -> Result<bool> {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Var(var) => {
                if var.is_rigid {
                    Ok(true)
                } else if self.default_type_var(ty) {
                    Ok(false)
                } else {
                    Err(CompileError::new(
                        CompileErrorKind::AmbiguousTypeVariable {
                            var: self.types.display(ty, self.symbols),
                            ty: self.types.display(whole, self.symbols),
                        },
                        span,
                    ))
                }
            }
            TypeTerm::App { left, right } => {
                let left_poly = self.unambiguous_poly_check(left, whole, span)?;
                let right_poly = self.unambiguous_poly_check(right, whole, span)?;
                Ok(left_poly || right_poly)
            }
            TypeTerm::Fun { arg, result } => {
                let arg_poly = self.unambiguous_poly_check(arg, whole, span)?;
                let result_poly = self.unambiguous_poly_check(result, whole, span)?;
                Ok(arg_poly || result_poly)
            }
            TypeTerm::Con { args, .. } => {
                let mut poly = false;
                for arg in args {
                    poly |= self.unambiguous_poly_check(arg, whole, span)?;
                }
                Ok(poly)
            }
            TypeTerm::For { body, .. } => {
                self.unambiguous_poly_check(body, whole, span)?;
                Ok(true)
            }
            TypeTerm::Nat(_) | TypeTerm::Sym(_) => Ok(false),
        }
    }

    fn collect_free_vars(&mut self, ty: TypeId, scope: Option<ScopeId>, out: &mut Vec<TypeId>) {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Var(var) => {
                if !var.is_rigid
                    && !self.is_bound_in_scope(ty, scope)
                    && !out.contains(&ty)
                {
                    out.push(ty);
                }
            }
            TypeTerm::App { left, right } => {
                self.collect_free_vars(left, scope, out);
                self.collect_free_vars(right, scope, out);
            }
            TypeTerm::Fun { arg, result } => {
                self.collect_free_vars(arg, scope, out);
                self.collect_free_vars(result, scope, out);
            }
            TypeTerm::Con { args, .. } => {
                for arg in args {
                    self.collect_free_vars(arg, scope, out);
                }
            }
            TypeTerm::For { body, .. } => self.collect_free_vars(body, scope, out),
            TypeTerm::Nat(_) | TypeTerm::Sym(_) => {}
        }
    }

    // ------------------------------------------------------------------
    // Defaulting
    // ------------------------------------------------------------------

    /// Try to default an unbound flex var from its class context:
    /// `Fractional` to `Float`, `Num` to `Int` (then `Float`), `Eq`/`Ord`
    /// alone to `()`. Returns true when the variable was bound.
    pub fn default_type_var(&mut self, var_ty: TypeId) -> bool {
        let var_ty = self.types.find(var_ty);
        let context = match self.types.term(var_ty) {
            TypeTerm::Var(v) if !v.is_rigid => v.context.clone(),
            _ => return false,
        };
        if context.is_empty() {
            return false;
        }
        let has = |class: SymbolId| context.contains(&class);
        let candidates: &[SymbolId] = if has(self.base.fractional_class) {
            &[self.base.float_type]
        } else if has(self.base.num_class) {
            &[self.base.int_type, self.base.float_type]
        } else if context
            .iter()
            .all(|&c| c == self.base.eq_class || c == self.base.ord_class)
        {
            &[self.base.unit_type]
        } else {
            &[]
        };
        for &candidate in candidates {
            let satisfied = context
                .iter()
                .all(|&class| self.classes.find_instance(class, candidate).is_some());
            if satisfied {
                let con_ty = self.types.mk_con(candidate, Vec::new());
                self.types.get_mut(con_ty).kind_of = Some(self.base.star_kind_ty);
                match &mut self.types.get_mut(var_ty).term {
                    TypeTerm::Var(v) => v.bound = Some(con_ty),
                    _ => unreachable!(),
                }
                return true;
            }
        }
        false
    }

    /// Walk a type defaulting residual flex vars; a var that cannot be
    /// defaulted is an ambiguous-type-variable error. Rigid vars pass.
    pub fn ambiguity_check(&mut self, ty: TypeId, whole: TypeId, span: SourceSpan) -> Result<()> {
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Var(var) => {
                if var.is_rigid || self.default_type_var(ty) {
                    Ok(())
                } else {
                    Err(CompileError::new(
                        CompileErrorKind::AmbiguousTypeVariable {
                            var: self.types.display(ty, self.symbols),
                            ty: self.types.display(whole, self.symbols),
                        },
                        span,
                    ))
                }
            }
            TypeTerm::App { left, right } => {
                self.ambiguity_check(left, whole, span)?;
                self.ambiguity_check(right, whole, span)
            }
            TypeTerm::Fun { arg, result } => {
                self.ambiguity_check(arg, whole, span)?;
                self.ambiguity_check(result, whole, span)
            }
            TypeTerm::Con { args, .. } => {
                for arg in args {
                    self.ambiguity_check(arg, whole, span)?;
                }
                Ok(())
            }
            TypeTerm::For { body, .. } => self.ambiguity_check(body, whole, span),
            TypeTerm::Nat(_) | TypeTerm::Sym(_) => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Structural equality
    // ------------------------------------------------------------------

    /// Structural equality after chasing bound vars; free vars compare by
    /// representative identity.
    pub fn types_equal(&self, t1: TypeId, t2: TypeId) -> bool {
        let t1 = self.types.find_const(t1);
        let t2 = self.types.find_const(t2);
        if t1 == t2 {
            return true;
        }
        match (self.types.term(t1), self.types.term(t2)) {
            (TypeTerm::Con { symbol: s1, args: a1 }, TypeTerm::Con { symbol: s2, args: a2 }) => {
                s1 == s2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(&x, &y)| self.types_equal(x, y))
            }
            (
                TypeTerm::Fun { arg: a1, result: r1 },
                TypeTerm::Fun { arg: a2, result: r2 },
            ) => self.types_equal(*a1, *a2) && self.types_equal(*r1, *r2),
            (
                TypeTerm::App { left: l1, right: r1 },
                TypeTerm::App { left: l2, right: r2 },
            ) => self.types_equal(*l1, *l2) && self.types_equal(*r1, *r2),
            (TypeTerm::Nat(n1), TypeTerm::Nat(n2)) => n1 == n2,
            (TypeTerm::Sym(s1), TypeTerm::Sym(s2)) => s1 == s2,
            (TypeTerm::Var(v1), TypeTerm::Var(v2)) => match (v1.symbol, v2.symbol) {
                (Some(s1), Some(s2)) => s1 == s2,
                _ => false,
            },
            _ => false,
        }
    }

    /// Fresh flex var of kind `Type`.
    pub fn fresh_star_var(&mut self, scope: Option<ScopeId>) -> TypeId {
        let var = self.types.mk_var(None, scope);
        self.types.get_mut(var).kind_of = Some(self.base.star_kind_ty);
        var
    }
}
