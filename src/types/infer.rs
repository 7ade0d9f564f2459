//! Hindley-Milner type and kind inference (phase E).
//!
//! Declaration groups are inferred in dependency order: data declarations
//! first, then classes and instances, then term bindings. Within a
//! recursive term group every binder is monomorphic; generalization
//! happens when the group completes. Every AST node leaves this phase
//! with a type, and every use site records the instantiation
//! substitutions monomorphization later replays.

use rustc_hash::FxHashMap;

use crate::base::{Interner, SourceSpan, Symbol};
use crate::error::{CompileError, CompileErrorKind, Result};
use crate::syntax::ast::{
    AstArena, AstId, AstKind, Constant, SigKind, TypeAttributeKind, VarKind,
};
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::{StateType, SymbolId, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::class::{ClassInstance, ClassTable, TypeClass};
use crate::types::kind::infer_default_unify_with_star;
use crate::types::unify::TypeEnv;
use crate::types::{TypeArena, TypeId, TypeOrder, TypeTerm};

struct Infer<'a> {
    ast: &'a mut AstArena,
    types: &'a mut TypeArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
    classes: &'a mut ClassTable,
    base: &'a BaseModule,
    interner: &'a mut Interner,
}

/// Infer types for the whole module.
pub fn infer(
    ast: &mut AstArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
    types: &mut TypeArena,
    classes: &mut ClassTable,
    base: &BaseModule,
    interner: &mut Interner,
) -> Result<()> {
    let Some(root) = ast.root else {
        return Ok(());
    };
    let mut infer = Infer {
        ast,
        types,
        symbols,
        scopes,
        classes,
        base,
        interner,
    };
    infer.infer_group_list(root)?;
    // Structural nodes (signature plumbing, contexts) that carry no
    // interesting type still leave the phase typed.
    infer.finalize_node_types(root);
    Ok(())
}

impl<'a> Infer<'a> {
    /// Borrow the pieces the unifier needs.
    fn env(&mut self) -> TypeEnv<'_> {
        TypeEnv {
            types: &mut *self.types,
            symbols: &mut *self.symbols,
            scopes: self.scopes,
            classes: &*self.classes,
            base: self.base,
            interner: &mut *self.interner,
        }
    }

    fn finalize_node_types(&mut self, id: AstId) {
        if self.ast.ty(id).is_none() {
            let unit = self.prim_ty(self.base.unit_type);
            self.ast.set_ty(id, unit);
        }
        for child in self.ast.children(id) {
            self.finalize_node_types(child);
        }
    }

    fn prim_ty(&self, symbol: SymbolId) -> TypeId {
        self.symbols
            .get(symbol)
            .ty
            .expect("base symbol carries a pre-supplied type")
    }

    fn set_node_ty(&mut self, id: AstId, ty: TypeId) {
        self.ast.set_ty(id, ty);
    }

    // ==================================================================
    // Declaration groups
    // ==================================================================

    fn infer_group_list(&mut self, list: AstId) -> Result<()> {
        let AstKind::DeclarationGroupList { groups } = self.ast.kind(list).clone() else {
            return Ok(());
        };
        for group in groups {
            self.infer_group(group)?;
        }
        // Group lists are structural nodes; give them the unit type so the
        // every-node-typed invariant holds.
        let unit = self.prim_ty(self.base.unit_type);
        self.set_node_ty(list, unit);
        Ok(())
    }

    fn infer_group(&mut self, group: AstId) -> Result<()> {
        let AstKind::DeclarationGroup { declarations } = self.ast.kind(group).clone() else {
            return Ok(());
        };
        // Type-level declarations first (already ordered by phase D).
        let mut term_decls = Vec::new();
        for decl in declarations {
            match self.ast.kind(decl).clone() {
                AstKind::DataDeclaration { .. } => self.declare_data(decl)?,
                AstKind::TypeClassDeclaration { .. } => self.declare_class(decl)?,
                AstKind::TypeClassInstance { .. } => self.declare_instance(decl)?,
                AstKind::TypeSignature { .. } => {
                    // Attached signatures are pulled in by their bindings.
                    let ty = self.signature_type(decl)?;
                    self.set_node_ty(decl, ty);
                }
                _ => term_decls.push(decl),
            }
        }
        self.infer_term_group(&term_decls)?;
        let unit = self.prim_ty(self.base.unit_type);
        self.set_node_ty(group, unit);
        Ok(())
    }

    // ==================================================================
    // Data declarations
    // ==================================================================

    fn declare_data(&mut self, decl: AstId) -> Result<()> {
        let AstKind::DataDeclaration {
            symbol,
            simple_type,
            constructors,
            ..
        } = self.ast.kind(decl).clone()
        else {
            return Ok(());
        };
        let span = self.ast.span(decl);
        let AstKind::SimpleType {
            type_con,
            type_vars,
        } = self.ast.kind(simple_type).clone()
        else {
            return Ok(());
        };

        // One rigid var per head variable, with a fresh kind defaulting to
        // Type.
        let mut var_env: FxHashMap<Symbol, TypeId> = FxHashMap::default();
        let mut head_vars = Vec::with_capacity(type_vars.len());
        let mut head_var_symbols = Vec::with_capacity(type_vars.len());
        for var_node in &type_vars {
            let AstKind::Variable { symbol: var_symbol, .. } = self.ast.kind(*var_node).clone()
            else {
                continue;
            };
            let var_ty = self.types.mk_rigid_var(var_symbol, None);
            let kind_var = self.types.mk_var(None, None);
            self.types.get_mut(var_ty).kind_of = Some(kind_var);
            self.symbols.get_mut(var_symbol).ty = Some(var_ty);
            var_env.insert(self.symbols.source_name(var_symbol).clone(), var_ty);
            head_vars.push(var_ty);
            head_var_symbols.push(var_symbol);
            self.set_node_ty(*var_node, var_ty);
        }

        // The type constructor's kind covers every head variable.
        let mut kind = self.base.star_kind_ty;
        for &var_ty in head_vars.iter().rev() {
            let var_kind = self.types.get(var_ty).kind_of.expect("head var kind set");
            kind = self.types.mk_fun(var_kind, kind);
        }
        let con_ty = self.types.mk_con(symbol, Vec::new());
        self.types.get_mut(con_ty).kind_of = Some(kind);
        self.symbols.get_mut(symbol).ty = Some(con_ty);

        let result_ty = self.types.mk_con(symbol, head_vars.clone());
        self.types.get_mut(result_ty).kind_of = Some(self.base.star_kind_ty);
        self.set_node_ty(simple_type, result_ty);
        self.set_node_ty(type_con, con_ty);

        // Constructors: field types -> T a1 .. ak, quantified per head var.
        for con_node in constructors {
            let AstKind::Constructor { conid, args } = self.ast.kind(con_node).clone() else {
                continue;
            };
            let AstKind::ConId { symbol: con_symbol, .. } = self.ast.kind(conid).clone() else {
                continue;
            };
            let mut field_tys = Vec::with_capacity(args.len());
            for arg in &args {
                let field_ty = self.ast_to_type(*arg, &mut var_env)?;
                infer_default_unify_with_star(
                    self.types,
                    self.symbols,
                    self.base,
                    field_ty,
                    span,
                )?;
                field_tys.push(field_ty);
            }
            let mut con_fn_ty = self.types.mk_fun_chain(&field_tys, result_ty);
            for &var_symbol in head_var_symbols.iter().rev() {
                con_fn_ty = self.types.mk_for_all(var_symbol, Vec::new(), con_fn_ty);
            }
            {
                let sym = self.symbols.get_mut(con_symbol);
                sym.ty = Some(con_fn_ty);
                sym.state_type = StateType::Poly;
            }
            self.set_node_ty(con_node, con_fn_ty);
            self.set_node_ty(conid, con_fn_ty);
        }

        self.set_node_ty(decl, result_ty);
        Ok(())
    }

    // ==================================================================
    // Classes and instances
    // ==================================================================

    fn declare_class(&mut self, decl: AstId) -> Result<()> {
        let AstKind::TypeClassDeclaration {
            symbol,
            context,
            class_var,
            declarations,
        } = self.ast.kind(decl).clone()
        else {
            return Ok(());
        };
        let AstKind::Variable { symbol: class_var_symbol, .. } =
            self.ast.kind(class_var).clone()
        else {
            return Ok(());
        };

        // Super classes from the declaration context.
        let mut super_classes = Vec::new();
        for ctx in &context {
            if let AstKind::TypeClassContext { class_conid, .. } = self.ast.kind(*ctx) {
                if let AstKind::ConId { symbol: super_symbol, .. } = self.ast.kind(*class_conid) {
                    super_classes.push(*super_symbol);
                }
            }
        }

        // The class variable: rigid, fresh kind.
        let class_var_ty = self.types.mk_rigid_var(class_var_symbol, None);
        let kind_var = self.types.mk_var(None, None);
        self.types.get_mut(class_var_ty).kind_of = Some(kind_var);
        self.symbols.get_mut(class_var_symbol).ty = Some(class_var_ty);
        self.set_node_ty(class_var, class_var_ty);

        // Method signatures.
        let mut members = Vec::new();
        if let Some(declarations) = declarations {
            if let AstKind::DeclarationList { declarations } =
                self.ast.kind(declarations).clone()
            {
                for method_decl in declarations {
                    let AstKind::TypeSignature {
                        var,
                        context: method_context,
                        ty,
                        sig_kind: SigKind::ClassSig,
                    } = self.ast.kind(method_decl).clone()
                    else {
                        continue;
                    };
                    let AstKind::Variable { symbol: method_symbol, .. } =
                        self.ast.kind(var).clone()
                    else {
                        continue;
                    };
                    let class_var_name =
                        self.symbols.source_name(class_var_symbol).clone();
                    let mut var_env: FxHashMap<Symbol, TypeId> = FxHashMap::default();
                    var_env.insert(class_var_name, class_var_ty);
                    let body = self.ast_to_type(ty, &mut var_env)?;
                    let span = self.ast.span(method_decl);
                    infer_default_unify_with_star(
                        self.types,
                        self.symbols,
                        self.base,
                        body,
                        span,
                    )?;
                    // Extra method-context constraints wrap inner binders.
                    let mut method_ty = body;
                    let mut inner_vars: Vec<(Symbol, TypeId)> = var_env
                        .iter()
                        .filter(|&(_, &v)| v != class_var_ty)
                        .map(|(n, &v)| (n.clone(), v))
                        .collect();
                    inner_vars.sort_by_key(|(_, v)| v.index());
                    for (name, var_ty) in inner_vars.iter().rev() {
                        let var_symbol = self.var_symbol_of(*var_ty, name);
                        let ctx = self.context_classes_for(&method_context, name);
                        method_ty = self.types.mk_for_all(var_symbol, ctx, method_ty);
                    }
                    method_ty =
                        self.types
                            .mk_for_all(class_var_symbol, vec![symbol], method_ty);
                    {
                        let sym = self.symbols.get_mut(method_symbol);
                        sym.ty = Some(method_ty);
                        sym.state_type = StateType::Pointwise;
                    }
                    self.set_node_ty(method_decl, method_ty);
                    self.set_node_ty(var, method_ty);
                    self.set_node_ty(ty, body);
                    members.push(method_symbol);
                }
            }
        }

        let class_id = self.classes.insert_class(TypeClass {
            class_symbol: symbol,
            class_var: class_var_symbol,
            members: members.clone(),
            super_classes,
            ast: Some(decl),
        });
        self.symbols.get_mut(symbol).type_class = Some(class_id);
        for member in members {
            self.symbols.get_mut(member).method_type_class = Some(class_id);
        }
        let unit = self.prim_ty(self.base.unit_type);
        self.set_node_ty(decl, unit);
        Ok(())
    }

    fn var_symbol_of(&mut self, var_ty: TypeId, name: &Symbol) -> SymbolId {
        match self.types.term(self.types.find_const(var_ty)) {
            TypeTerm::Var(var) => match var.symbol {
                Some(s) => s,
                None => {
                    let id = self.symbols.fresh(
                        name.clone(),
                        self.base.module_name.clone(),
                        SourceSpan::NULL,
                    );
                    self.symbols.get_mut(id).ty = Some(var_ty);
                    id
                }
            },
            _ => self.symbols.fresh(
                name.clone(),
                self.base.module_name.clone(),
                SourceSpan::NULL,
            ),
        }
    }

    /// Classes constraining `var_name` in a context list.
    fn context_classes_for(&self, context: &[AstId], var_name: &Symbol) -> Vec<SymbolId> {
        let mut out = Vec::new();
        for &ctx in context {
            let AstKind::TypeClassContext { class_conid, var } = self.ast.kind(ctx) else {
                continue;
            };
            let AstKind::Variable { symbol: var_symbol, .. } = self.ast.kind(*var) else {
                continue;
            };
            if self.symbols.source_name(*var_symbol) != var_name {
                continue;
            }
            if let AstKind::ConId { symbol: class_symbol, .. } = self.ast.kind(*class_conid) {
                out.push(*class_symbol);
            }
        }
        out
    }

    fn declare_instance(&mut self, decl: AstId) -> Result<()> {
        let AstKind::TypeClassInstance {
            symbol,
            class_conid,
            inst,
            declarations,
            ..
        } = self.ast.kind(decl).clone()
        else {
            return Ok(());
        };
        let span = self.ast.span(decl);
        let AstKind::ConId { symbol: class_symbol, .. } = self.ast.kind(class_conid).clone()
        else {
            return Ok(());
        };
        let Some(class_id) = self.symbols.get(class_symbol).type_class else {
            return Err(CompileError::not_in_scope(
                self.symbols.source_name(class_symbol).as_str().to_string(),
                span,
            ));
        };

        // Build the instance head type (`Int`, `Maybe a`, ...).
        let mut var_env: FxHashMap<Symbol, TypeId> = FxHashMap::default();
        let inst_ty = self.ast_to_type(inst, &mut var_env)?;
        let data_symbol = match self.types.term(self.types.find_const(inst_ty)) {
            TypeTerm::Con { symbol, .. } => *symbol,
            _ => {
                return Err(CompileError::new(
                    CompileErrorKind::MissingInstance {
                        class: self
                            .symbols
                            .source_name(class_symbol)
                            .as_str()
                            .to_string(),
                        ty: self.types.display(inst_ty, self.symbols),
                    },
                    span,
                ));
            }
        };

        // Super-class instances must be in scope.
        let class = self.classes.class(class_id).clone();
        for &super_class in &class.super_classes {
            if self.classes.find_instance(super_class, data_symbol).is_none() {
                return Err(CompileError::new(
                    CompileErrorKind::MissingInstance {
                        class: self
                            .symbols
                            .source_name(super_class)
                            .as_str()
                            .to_string(),
                        ty: self.symbols.source_name(data_symbol).as_str().to_string(),
                    },
                    span,
                ));
            }
        }

        // Method implementation bindings.
        let mut method_bindings = Vec::new();
        let mut term_decls = Vec::new();
        if let Some(declarations) = declarations {
            let decl_list = match self.ast.kind(declarations).clone() {
                AstKind::DeclarationList { declarations } => declarations,
                AstKind::DeclarationGroupList { groups } => {
                    let mut out = Vec::new();
                    for group in groups {
                        if let AstKind::DeclarationGroup { declarations } =
                            self.ast.kind(group).clone()
                        {
                            out.extend(declarations);
                        }
                    }
                    out
                }
                _ => Vec::new(),
            };
            for binding in decl_list {
                let binding_symbol = match self.ast.kind(binding) {
                    AstKind::SimpleAssignment { symbol, .. }
                    | AstKind::ApatsAssignment { symbol, .. } => *symbol,
                    _ => continue,
                };
                let binding_name = self.symbols.source_name(binding_symbol).clone();
                let method = class
                    .members
                    .iter()
                    .copied()
                    .find(|&m| *self.symbols.source_name(m) == binding_name);
                let Some(method) = method else {
                    return Err(CompileError::not_in_scope(
                        binding_name.as_str().to_string(),
                        self.ast.span(binding),
                    ));
                };

                // Expected type: the method type at this instance head.
                let method_ty = self.prim_ty(method);
                let expected = self.method_type_at(method_ty, inst_ty);
                self.symbols.get_mut(binding_symbol).ty = Some(expected);
                method_bindings.push((method, binding_symbol));
                term_decls.push((binding, binding_symbol, expected));
            }
        }

        let instance_id = self.classes.insert_instance(ClassInstance {
            instance_symbol: symbol,
            class_symbol,
            data_type_symbol: data_symbol,
            method_bindings,
            ast: Some(decl),
        });
        self.symbols.get_mut(symbol).type_class_instance = Some(instance_id);
        self.symbols
            .get_mut(data_symbol)
            .instance_list
            .push(instance_id);

        // Check the bodies against the concretized method types.
        for (binding, binding_symbol, expected) in term_decls {
            let inferred = self.infer_binding_body(binding)?;
            let span = self.ast.span(binding);
            let stripped = self.types.strip_for_all(expected);
            let scope = self.ast.get(binding).scope;
            self.env().unify(inferred, stripped, scope, span)?;
            self.symbols.get_mut(binding_symbol).ty = Some(expected);
            self.set_node_ty(binding, expected);
        }

        let unit = self.prim_ty(self.base.unit_type);
        self.set_node_ty(decl, unit);
        Ok(())
    }

    /// Substitute the class variable of a quantified method type with the
    /// instance head type, re-quantifying the remaining binders.
    fn method_type_at(&mut self, method_ty: TypeId, inst_ty: TypeId) -> TypeId {
        let method_ty = self.types.find(method_ty);
        let TypeTerm::For { var, body, .. } = self.types.term(method_ty).clone() else {
            return method_ty;
        };
        let mut subs = FxHashMap::default();
        subs.insert(var, inst_ty);
        self.env().replace_with_subs(body, &subs)
    }

    // ==================================================================
    // Term groups
    // ==================================================================

    fn infer_term_group(&mut self, decls: &[AstId]) -> Result<()> {
        // Pre-pass: binder monotypes (or signature types).
        for &decl in decls {
            match self.ast.kind(decl).clone() {
                AstKind::SimpleAssignment { symbol, .. }
                | AstKind::ApatsAssignment { symbol, .. } => {
                    let sig = self.symbols.get(symbol).optional_type_signature;
                    let ty = match sig {
                        Some(sig_node) => self.signature_type(sig_node)?,
                        None => {
                            let scope = self.ast.get(decl).scope;
                            self.env().fresh_star_var(scope)
                        }
                    };
                    self.symbols.get_mut(symbol).ty = Some(ty);
                }
                AstKind::PatAssignment { pat, .. } => {
                    self.assign_pattern_monotypes(pat);
                }
                _ => {}
            }
        }

        // Infer each declaration against its binder type.
        for &decl in decls {
            self.infer_declaration(decl)?;
        }

        // Post-pass: generalize unsigned function bindings. Simple value
        // bindings without a signature stay monomorphic (their residual
        // variables resolve by defaulting at specialization time).
        for &decl in decls {
            if let AstKind::ApatsAssignment { symbol, .. } = self.ast.kind(decl).clone() {
                if self.symbols.get(symbol).optional_type_signature.is_none() {
                    let ty = self.symbols.get(symbol).ty.expect("binder typed");
                    let scope = self.ast.get(decl).scope;
                    let generalized = self.env().generalize(ty, scope);
                    self.symbols.get_mut(symbol).ty = Some(generalized);
                }
            }
        }
        Ok(())
    }

    fn assign_pattern_monotypes(&mut self, pat: AstId) {
        if let AstKind::Variable {
            symbol,
            var_kind: VarKind::Declaration,
            ..
        } = self.ast.kind(pat)
        {
            let symbol = *symbol;
            if self.symbols.get(symbol).ty.is_none() {
                let scope = self.ast.get(pat).scope;
                let var = self.env().fresh_star_var(scope);
                self.symbols.get_mut(symbol).ty = Some(var);
            }
        }
        for child in self.ast.children(pat) {
            self.assign_pattern_monotypes(child);
        }
    }

    fn infer_declaration(&mut self, decl: AstId) -> Result<()> {
        let span = self.ast.span(decl);
        let scope = self.ast.get(decl).scope;
        match self.ast.kind(decl).clone() {
            AstKind::SimpleAssignment {
                symbol,
                initializer,
                rhs,
                is_recursive,
            } => {
                let binder_ty = self.symbols.get(symbol).ty.expect("binder typed");
                let expected = self.types.strip_for_all(binder_ty);
                let rhs_ty = self.infer_expr(rhs)?;
                self.env().unify(expected, rhs_ty, scope, span)?;

                if let Some(initializer) = initializer {
                    // `~ init`: the binding must be recursive, and its
                    // type must be zero-order.
                    let name = self.symbols.source_name(symbol).as_str().to_string();
                    if !is_recursive && !self.symbols.get(symbol).is_recursive {
                        return Err(CompileError::new(
                            CompileErrorKind::NonRecursiveInitializedValue { name },
                            span,
                        ));
                    }
                    let init_ty = self.infer_expr(initializer)?;
                    self.env().unify(expected, init_ty, scope, span)?;
                    if self.types.is_fun(expected) {
                        return Err(CompileError::new(
                            CompileErrorKind::NonConcreteInitializedValue {
                                name,
                                ty: self.types.display(expected, self.symbols),
                            },
                            span,
                        ));
                    }
                    self.set_var_order(expected, TypeOrder::Zero);
                }
                self.set_node_ty(decl, expected);
                Ok(())
            }

            AstKind::ApatsAssignment {
                symbol, apats, rhs, ..
            } => {
                let binder_ty = self.symbols.get(symbol).ty.expect("binder typed");
                let expected = self.types.strip_for_all(binder_ty);
                let mut param_tys = Vec::with_capacity(apats.len());
                for &apat in &apats {
                    let scope = self.ast.get(apat).scope;
                    let param_ty = self.env().fresh_star_var(scope);
                    self.infer_pattern(apat, param_ty)?;
                    param_tys.push(param_ty);
                }
                let rhs_ty = self.infer_expr(rhs)?;
                let fn_ty = self.types.mk_fun_chain(&param_tys, rhs_ty);
                self.env().unify(expected, fn_ty, scope, span)?;
                self.set_node_ty(decl, expected);
                Ok(())
            }

            AstKind::PatAssignment { pat, rhs } => {
                let rhs_ty = self.infer_expr(rhs)?;
                self.infer_pattern(pat, rhs_ty)?;
                self.set_node_ty(decl, rhs_ty);
                Ok(())
            }

            _ => Ok(()),
        }
    }

    /// Infer the body of an apats/simple binding, producing its full
    /// function type (used by instance method checking).
    fn infer_binding_body(&mut self, decl: AstId) -> Result<TypeId> {
        match self.ast.kind(decl).clone() {
            AstKind::SimpleAssignment { rhs, .. } => self.infer_expr(rhs),
            AstKind::ApatsAssignment { apats, rhs, .. } => {
                let mut param_tys = Vec::with_capacity(apats.len());
                for &apat in &apats {
                    let scope = self.ast.get(apat).scope;
                    let param_ty = self.env().fresh_star_var(scope);
                    self.infer_pattern(apat, param_ty)?;
                    param_tys.push(param_ty);
                }
                let rhs_ty = self.infer_expr(rhs)?;
                Ok(self.types.mk_fun_chain(&param_tys, rhs_ty))
            }
            _ => self.infer_expr(decl),
        }
    }

    fn set_var_order(&mut self, ty: TypeId, order: TypeOrder) {
        let ty = self.types.find(ty);
        if let TypeTerm::Var(_) = self.types.term(ty) {
            match &mut self.types.get_mut(ty).term {
                TypeTerm::Var(var) => var.order = order,
                _ => unreachable!(),
            }
        }
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    fn infer_expr(&mut self, id: AstId) -> Result<TypeId> {
        let span = self.ast.span(id);
        let scope = self.ast.get(id).scope;
        let ty = match self.ast.kind(id).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Var,
                ..
            } => {
                let sym_ty = self.symbols.get(symbol).ty.ok_or_else(|| {
                    CompileError::not_in_scope(
                        self.symbols.source_name(symbol).as_str().to_string(),
                        span,
                    )
                })?;
                let (inst, subs) = self.env().instantiate(sym_ty, scope);
                if let AstKind::Variable { inst_subs, .. } = &mut self.ast.get_mut(id).kind {
                    *inst_subs = subs;
                }
                inst
            }

            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                initializer,
                ..
            } => {
                let ty = match self.symbols.get(symbol).ty {
                    Some(ty) => ty,
                    None => {
                        let var = self.env().fresh_star_var(scope);
                        self.symbols.get_mut(symbol).ty = Some(var);
                        var
                    }
                };
                if let Some(initializer) = initializer {
                    let init_ty = self.infer_expr(initializer)?;
                    self.env().unify(ty, init_ty, scope, span)?;
                }
                ty
            }

            AstKind::Variable { symbol, .. } => {
                // Signature variables and type vars carry their symbol's
                // type when it exists.
                match self.symbols.get(symbol).ty {
                    Some(ty) => ty,
                    None => self.env().fresh_star_var(scope),
                }
            }

            AstKind::ConId { symbol, .. } => {
                let sym_ty = self.symbols.get(symbol).ty.ok_or_else(|| {
                    CompileError::not_in_scope(
                        self.symbols.source_name(symbol).as_str().to_string(),
                        span,
                    )
                })?;
                let (inst, _) = self.env().instantiate(sym_ty, scope);
                inst
            }

            AstKind::Constant { value } => match value {
                Constant::Integer(_) => self.prim_ty(self.base.int_type),
                Constant::Float(_) => self.prim_ty(self.base.rational_type),
                Constant::UInt(_) => self.prim_ty(self.base.uint_type),
                Constant::Char(_) => self.prim_ty(self.base.char_type),
                Constant::String(s) => {
                    // Strings are char arrays.
                    let len = self.types.mk_nat(s.as_str().len() as u64 + 1);
                    self.types.get_mut(len).kind_of = Some(self.base.nat_kind_ty);
                    let char_ty = self.prim_ty(self.base.char_type);
                    let array = self.types.mk_con(self.base.array_type, vec![len, char_ty]);
                    self.types.get_mut(array).kind_of = Some(self.base.star_kind_ty);
                    array
                }
            },

            AstKind::Wildcard => self.env().fresh_star_var(scope),

            AstKind::App { function, argument } => {
                let fn_ty = self.infer_expr(function)?;
                let arg_ty = self.infer_expr(argument)?;
                let result = self.env().fresh_star_var(scope);
                let expected = self.types.mk_fun(arg_ty, result);
                self.env().unify(fn_ty, expected, scope, span)?;
                self.types.find(result)
            }

            AstKind::BinOp { symbol, lhs, rhs, .. } => {
                let sym_ty = self.symbols.get(symbol).ty.ok_or_else(|| {
                    CompileError::not_in_scope(
                        self.symbols.source_name(symbol).as_str().to_string(),
                        span,
                    )
                })?;
                let (inst, subs) = self.env().instantiate(sym_ty, scope);
                if let AstKind::BinOp { inst_subs, .. } = &mut self.ast.get_mut(id).kind {
                    *inst_subs = subs;
                }
                let lhs_ty = self.infer_expr(lhs)?;
                let rhs_ty = self.infer_expr(rhs)?;
                let result = self.env().fresh_star_var(scope);
                let inner = self.types.mk_fun(rhs_ty, result);
                let expected = self.types.mk_fun(lhs_ty, inner);
                self.env().unify(inst, expected, scope, span)?;
                self.types.find(result)
            }

            AstKind::OpLeftSection { symbol, left, .. } => {
                let sym_ty = self.symbols.get(symbol).ty.expect("operator typed");
                let (inst, subs) = self.env().instantiate(sym_ty, scope);
                if let AstKind::OpLeftSection { inst_subs, .. } = &mut self.ast.get_mut(id).kind
                {
                    *inst_subs = subs;
                }
                let left_ty = self.infer_expr(left)?;
                let b = self.env().fresh_star_var(scope);
                let c = self.env().fresh_star_var(scope);
                let inner = self.types.mk_fun(b, c);
                let expected = self.types.mk_fun(left_ty, inner);
                self.env().unify(inst, expected, scope, span)?;
                self.types.find(inner)
            }

            AstKind::OpRightSection { symbol, right, .. } => {
                let sym_ty = self.symbols.get(symbol).ty.expect("operator typed");
                let (inst, subs) = self.env().instantiate(sym_ty, scope);
                if let AstKind::OpRightSection { inst_subs, .. } =
                    &mut self.ast.get_mut(id).kind
                {
                    *inst_subs = subs;
                }
                let right_ty = self.infer_expr(right)?;
                let a = self.env().fresh_star_var(scope);
                let c = self.env().fresh_star_var(scope);
                let inner = self.types.mk_fun(right_ty, c);
                let expected = self.types.mk_fun(a, inner);
                self.env().unify(inst, expected, scope, span)?;
                self.types.mk_fun(a, c)
            }

            AstKind::IfThenElse {
                if_expr,
                then_expr,
                else_expr,
            } => {
                let cond_ty = self.infer_expr(if_expr)?;
                let bool_ty = self.prim_ty(self.base.bool_type);
                self.env().unify(cond_ty, bool_ty, scope, span)?;
                let then_ty = self.infer_expr(then_expr)?;
                let else_ty = self.infer_expr(else_expr)?;
                self.env().unify(then_ty, else_ty, scope, span)?;
                self.types.find(then_ty)
            }

            AstKind::Lambda { apats, expression } => {
                let mut param_tys = Vec::with_capacity(apats.len());
                for &apat in &apats {
                    let scope = self.ast.get(apat).scope;
                    let param_ty = self.env().fresh_star_var(scope);
                    self.infer_pattern(apat, param_ty)?;
                    param_tys.push(param_ty);
                }
                let body_ty = self.infer_expr(expression)?;
                self.types.mk_fun_chain(&param_tys, body_ty)
            }

            AstKind::Let {
                declarations,
                expression,
            } => {
                self.infer_group_list(declarations)?;
                self.infer_expr(expression)?
            }

            AstKind::Rhs {
                expression,
                declarations,
            } => {
                if let Some(declarations) = declarations {
                    self.infer_group_list(declarations)?;
                }
                self.infer_expr(expression)?
            }

            AstKind::Case {
                expression,
                alternatives,
            } => {
                let scrutinee_ty = self.infer_expr(expression)?;
                let result = self.env().fresh_star_var(scope);
                for alt in alternatives {
                    let AstKind::CaseAlternative { pat, body } = self.ast.kind(alt).clone()
                    else {
                        continue;
                    };
                    self.infer_pattern(pat, scrutinee_ty)?;
                    let body_ty = self.infer_expr(body)?;
                    let alt_span = self.ast.span(alt);
                    self.env().unify(result, body_ty, scope, alt_span)?;
                    self.set_node_ty(alt, body_ty);
                }
                self.types.find(result)
            }

            AstKind::Tuple { expressions } => {
                let mut element_tys = Vec::with_capacity(expressions.len());
                for &expr in &expressions {
                    element_tys.push(self.infer_expr(expr)?);
                }
                let tuple_type = self
                    .base
                    .tuple_type(expressions.len())
                    .expect("tuple arity within 2..=10");
                let ty = self.types.mk_con(tuple_type, element_tys);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                ty
            }

            AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions } => {
                let elem = self.env().fresh_star_var(scope);
                for &expr in &expressions {
                    let expr_ty = self.infer_expr(expr)?;
                    self.env().unify(elem, expr_ty, scope, span)?;
                }
                // Higher-order arrays are not supported downstream.
                if self.types.is_fun(elem) {
                    return Err(CompileError::new(
                        CompileErrorKind::MismatchedType {
                            left: self.types.display(elem, self.symbols),
                            right: "a zero-order array element".to_string(),
                        },
                        span,
                    ));
                }
                let len = self.types.mk_nat(expressions.len() as u64);
                self.types.get_mut(len).kind_of = Some(self.base.nat_kind_ty);
                let ty = self.types.mk_con(self.base.array_type, vec![len, elem]);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                ty
            }

            AstKind::PatExpression { expressions } => {
                let elem = self.env().fresh_star_var(scope);
                for &expr in &expressions {
                    let expr_ty = self.infer_expr(expr)?;
                    self.env().unify(elem, expr_ty, scope, span)?;
                }
                let ty = self.types.mk_con(self.base.pattern_type, vec![elem]);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                ty
            }

            AstKind::SeqExpression { expressions } => {
                let elem = self.env().fresh_star_var(scope);
                for &expr in &expressions {
                    let expr_ty = self.infer_expr(expr)?;
                    self.env().unify(elem, expr_ty, scope, span)?;
                }
                let ty = self.types.mk_con(self.base.seq_type, vec![elem]);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                ty
            }

            AstKind::ArithmeticSequence { from, then, to } => {
                let elem = self.infer_expr(from)?;
                if let Some(then) = then {
                    let then_ty = self.infer_expr(then)?;
                    self.env().unify(elem, then_ty, scope, span)?;
                }
                if let Some(to) = to {
                    let to_ty = self.infer_expr(to)?;
                    self.env().unify(elem, to_ty, scope, span)?;
                }
                let ty = self.types.mk_con(self.base.seq_type, vec![elem]);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                ty
            }

            AstKind::Do { statements } => {
                // The monad var: m :: Type -> Type, constrained by Monad.
                let m = {
                    let star = self.base.star_kind_ty;
                    let kind = self.types.mk_fun(star, star);
                    let var = self.types.mk_var(None, scope);
                    self.types.get_mut(var).kind_of = Some(kind);
                    match &mut self.types.get_mut(var).term {
                        TypeTerm::Var(v) => v.context.push(self.base.monad_class),
                        _ => unreachable!(),
                    }
                    var
                };
                let mut last_ty = None;
                for &statement in &statements {
                    let stmt_span = self.ast.span(statement);
                    match self.ast.kind(statement).clone() {
                        AstKind::BindAssignment { symbol, expression } => {
                            let expr_ty = self.infer_expr(expression)?;
                            let elem = self.env().fresh_star_var(scope);
                            let expected = self.types.mk_app(m, elem);
                            self.types.get_mut(expected).kind_of =
                                Some(self.base.star_kind_ty);
                            self.env().unify(expr_ty, expected, scope, stmt_span)?;
                            self.symbols.get_mut(symbol).ty = Some(elem);
                            self.set_node_ty(statement, expected);
                            last_ty = Some(expected);
                        }
                        AstKind::PatBindAssignment { pat, expression } => {
                            let expr_ty = self.infer_expr(expression)?;
                            let elem = self.env().fresh_star_var(scope);
                            let expected = self.types.mk_app(m, elem);
                            self.types.get_mut(expected).kind_of =
                                Some(self.base.star_kind_ty);
                            self.env().unify(expr_ty, expected, scope, stmt_span)?;
                            self.infer_pattern(pat, elem)?;
                            self.set_node_ty(statement, expected);
                            last_ty = Some(expected);
                        }
                        _ => {
                            let stmt_ty = self.infer_expr(statement)?;
                            let elem = self.env().fresh_star_var(scope);
                            let expected = self.types.mk_app(m, elem);
                            self.types.get_mut(expected).kind_of =
                                Some(self.base.star_kind_ty);
                            self.env().unify(stmt_ty, expected, scope, stmt_span)?;
                            last_ty = Some(stmt_ty);
                        }
                    }
                }
                last_ty.unwrap_or_else(|| self.prim_ty(self.base.unit_type))
            }

            AstKind::BindAssignment { expression, .. }
            | AstKind::PatBindAssignment { expression, .. } => self.infer_expr(expression)?,

            AstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => {
                self.infer_expr(range_init)?;
                let value_ty = self.infer_expr(value_init)?;
                let index_ty = self.prim_ty(self.base.index_type);
                self.infer_pattern(index_apat, index_ty)?;
                self.infer_pattern(value_apat, value_ty)?;
                let body_ty = self.infer_expr(expression)?;
                self.env().unify(value_ty, body_ty, scope, span)?;
                self.types.find(value_ty)
            }

            AstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => {
                let value_ty = self.infer_expr(value_init)?;
                self.infer_pattern(value_apat, value_ty)?;
                let cond_ty = self.infer_expr(while_expression)?;
                let bool_ty = self.prim_ty(self.base.bool_type);
                self.env().unify(cond_ty, bool_ty, scope, span)?;
                let body_ty = self.infer_expr(do_expression)?;
                self.env().unify(value_ty, body_ty, scope, span)?;
                self.types.find(value_ty)
            }

            AstKind::Constructor { conid, args } => {
                let con_ty = self.infer_expr(conid)?;
                let mut acc = con_ty;
                for &arg in &args {
                    let arg_ty = self.infer_expr(arg)?;
                    let result = self.env().fresh_star_var(scope);
                    let expected = self.types.mk_fun(arg_ty, result);
                    self.env().unify(acc, expected, scope, span)?;
                    acc = self.types.find(result);
                }
                acc
            }

            // Declarations reached through expression positions.
            AstKind::TopDecl { .. }
            | AstKind::DeclarationList { .. }
            | AstKind::DeclarationGroupList { .. } => {
                self.infer_group_list(id)?;
                self.prim_ty(self.base.unit_type)
            }

            other => {
                // Remaining forms (type terms in expression positions)
                // should not occur; give them a fresh var to stay total.
                let _ = other;
                self.env().fresh_star_var(scope)
            }
        };
        self.set_node_ty(id, ty);
        Ok(ty)
    }

    // ==================================================================
    // Patterns
    // ==================================================================

    fn infer_pattern(&mut self, pat: AstId, expected: TypeId) -> Result<()> {
        let span = self.ast.span(pat);
        let scope = self.ast.get(pat).scope;
        match self.ast.kind(pat).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                initializer,
                ..
            } => {
                match self.symbols.get(symbol).ty {
                    Some(ty) => self.env().unify(ty, expected, scope, span)?,
                    None => self.symbols.get_mut(symbol).ty = Some(expected),
                }
                if let Some(initializer) = initializer {
                    let init_ty = self.infer_expr(initializer)?;
                    self.env().unify(expected, init_ty, scope, span)?;
                }
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::Wildcard => {
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::Constant { .. } => {
                let lit_ty = self.infer_literal_pattern(pat)?;
                self.env().unify(expected, lit_ty, scope, span)?;
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::ConId { symbol, .. } => {
                let sym_ty = self.symbols.get(symbol).ty.ok_or_else(|| {
                    CompileError::not_in_scope(
                        self.symbols.source_name(symbol).as_str().to_string(),
                        span,
                    )
                })?;
                let (inst, _) = self.env().instantiate(sym_ty, scope);
                self.env().unify(inst, expected, scope, span)?;
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::Constructor { conid, args } => {
                let AstKind::ConId { symbol, .. } = self.ast.kind(conid).clone() else {
                    return Ok(());
                };
                let sym_ty = self.symbols.get(symbol).ty.ok_or_else(|| {
                    CompileError::not_in_scope(
                        self.symbols.source_name(symbol).as_str().to_string(),
                        span,
                    )
                })?;
                let (inst, _) = self.env().instantiate(sym_ty, scope);
                self.set_node_ty(conid, inst);
                let mut acc = inst;
                for &arg in &args {
                    let acc_found = self.types.find(acc);
                    let (field_ty, rest) = match self.types.term(acc_found).clone() {
                        TypeTerm::Fun { arg, result } => (arg, result),
                        _ => {
                            let field = self.env().fresh_star_var(scope);
                            let rest = self.env().fresh_star_var(scope);
                            let expected_fn = self.types.mk_fun(field, rest);
                            self.env().unify(acc_found, expected_fn, scope, span)?;
                            (field, rest)
                        }
                    };
                    self.infer_pattern(arg, field_ty)?;
                    acc = rest;
                }
                self.env().unify(acc, expected, scope, span)?;
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::Tuple { expressions } => {
                let mut element_tys = Vec::with_capacity(expressions.len());
                for _ in 0..expressions.len() {
                    element_tys.push(self.env().fresh_star_var(scope));
                }
                let tuple_type = self
                    .base
                    .tuple_type(expressions.len())
                    .expect("tuple arity within 2..=10");
                let tuple_ty = self.types.mk_con(tuple_type, element_tys.clone());
                self.types.get_mut(tuple_ty).kind_of = Some(self.base.star_kind_ty);
                self.env().unify(tuple_ty, expected, scope, span)?;
                for (&expr, &elem_ty) in expressions.iter().zip(element_tys.iter()) {
                    self.infer_pattern(expr, elem_ty)?;
                }
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::BinOpSym { op, left, right } => {
                let AstKind::ConId { symbol, .. } = self.ast.kind(op).clone() else {
                    return Ok(());
                };
                let sym_ty = self.symbols.get(symbol).ty.ok_or_else(|| {
                    CompileError::not_in_scope(
                        self.symbols.source_name(symbol).as_str().to_string(),
                        span,
                    )
                })?;
                let (inst, _) = self.env().instantiate(sym_ty, scope);
                let l = self.env().fresh_star_var(scope);
                let r = self.env().fresh_star_var(scope);
                let inner = self.types.mk_fun(r, expected);
                let expected_fn = self.types.mk_fun(l, inner);
                self.env().unify(inst, expected_fn, scope, span)?;
                self.infer_pattern(left, l)?;
                self.infer_pattern(right, r)?;
                self.set_node_ty(pat, expected);
                Ok(())
            }

            AstKind::ExpressionList { expressions } | AstKind::ExpressionArray { expressions } => {
                let elem = self.env().fresh_star_var(scope);
                for &expr in &expressions {
                    self.infer_pattern(expr, elem)?;
                }
                let len = self.types.mk_nat(expressions.len() as u64);
                self.types.get_mut(len).kind_of = Some(self.base.nat_kind_ty);
                let ty = self.types.mk_con(self.base.array_type, vec![len, elem]);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                self.env().unify(ty, expected, scope, span)?;
                self.set_node_ty(pat, expected);
                Ok(())
            }

            _ => {
                self.set_node_ty(pat, expected);
                Ok(())
            }
        }
    }

    fn infer_literal_pattern(&mut self, pat: AstId) -> Result<TypeId> {
        let AstKind::Constant { value } = self.ast.kind(pat).clone() else {
            unreachable!("literal pattern");
        };
        Ok(match value {
            Constant::Integer(_) => self.prim_ty(self.base.int_type),
            Constant::Float(_) => self.prim_ty(self.base.float_type),
            Constant::UInt(_) => self.prim_ty(self.base.uint_type),
            Constant::Char(_) => self.prim_ty(self.base.char_type),
            Constant::String(_) => self.prim_ty(self.base.char_type),
        })
    }

    // ==================================================================
    // Signature and type-term conversion
    // ==================================================================

    /// Convert a free-standing signature into a quantified type.
    fn signature_type(&mut self, sig: AstId) -> Result<TypeId> {
        if let Some(ty) = self.ast.ty(sig) {
            return Ok(ty);
        }
        let AstKind::TypeSignature {
            var, context, ty, ..
        } = self.ast.kind(sig).clone()
        else {
            unreachable!("signature node");
        };
        let span = self.ast.span(sig);
        let mut var_env: FxHashMap<Symbol, TypeId> = FxHashMap::default();
        let body = self.ast_to_type(ty, &mut var_env)?;
        infer_default_unify_with_star(self.types, self.symbols, self.base, body, span)?;

        // A unique attribute directly on a functional signature would let
        // a local function perform in-place updates.
        if self.types.is_fun(body) {
            if let Some(ownership) = self.types.get(self.types.find_const(body)).ownership {
                let ownership = self.types.find_const(ownership);
                if matches!(
                    self.types.term(ownership),
                    TypeTerm::Con { symbol, .. } if *symbol == self.base.ownership_unique
                ) {
                    let name = match self.ast.kind(var) {
                        AstKind::Variable { symbol, .. } => {
                            self.symbols.source_name(*symbol).as_str().to_string()
                        }
                        _ => "<signature>".to_string(),
                    };
                    return Err(CompileError::new(
                        CompileErrorKind::UniquenessViolation { name },
                        span,
                    ));
                }
            }
        }

        // Quantify over signature variables in first-appearance order.
        let mut sig_vars: Vec<(Symbol, TypeId)> =
            var_env.iter().map(|(n, &v)| (n.clone(), v)).collect();
        sig_vars.sort_by_key(|(_, v)| v.index());
        let mut result = body;
        for (name, var_ty) in sig_vars.iter().rev() {
            let var_symbol = self.var_symbol_of(*var_ty, name);
            let ctx = self.context_classes_for(&context, name);
            let var_root = self.types.find_const(*var_ty);
            match &mut self.types.get_mut(var_root).term {
                TypeTerm::Var(v) => {
                    for &class in &ctx {
                        if !v.context.contains(&class) {
                            v.context.push(class);
                        }
                    }
                }
                _ => {}
            }
            result = self.types.mk_for_all(var_symbol, ctx, result);
        }
        self.set_node_ty(sig, result);
        Ok(result)
    }

    /// Convert an AST type term, threading the signature's variable
    /// environment. New variables are rigid.
    fn ast_to_type(
        &mut self,
        id: AstId,
        var_env: &mut FxHashMap<Symbol, TypeId>,
    ) -> Result<TypeId> {
        let span = self.ast.span(id);
        let ty = match self.ast.kind(id).clone() {
            AstKind::ConId { symbol, .. } => {
                let declared = self.symbols.get(symbol).ty;
                match declared {
                    Some(ty) => ty,
                    None => {
                        return Err(CompileError::not_in_scope(
                            self.symbols.source_name(symbol).as_str().to_string(),
                            span,
                        ));
                    }
                }
            }

            AstKind::Variable { symbol, .. } => {
                let name = self.symbols.source_name(symbol).clone();
                match var_env.get(&name) {
                    Some(&ty) => ty,
                    None => {
                        let var_ty = self.types.mk_rigid_var(symbol, None);
                        let kind_var = self.types.mk_var(None, None);
                        self.types.get_mut(var_ty).kind_of = Some(kind_var);
                        self.symbols.get_mut(symbol).ty = Some(var_ty);
                        var_env.insert(name, var_ty);
                        var_ty
                    }
                }
            }

            AstKind::TypeApp { ty, arg } => {
                // Collect the application spine.
                let mut args = vec![arg];
                let mut head = ty;
                while let AstKind::TypeApp { ty, arg } = self.ast.kind(head).clone() {
                    args.push(arg);
                    head = ty;
                }
                args.reverse();
                let arg_tys = args
                    .iter()
                    .map(|&a| self.ast_to_type(a, var_env))
                    .collect::<Result<Vec<_>>>()?;
                match self.ast.kind(head).clone() {
                    AstKind::ConId { symbol, .. } => {
                        let con = self.types.mk_con(symbol, arg_tys);
                        crate::types::kind::kind_infer(
                            self.types,
                            self.symbols,
                            self.base,
                            con,
                            span,
                        )?;
                        con
                    }
                    _ => {
                        let mut acc = self.ast_to_type(head, var_env)?;
                        for arg_ty in arg_tys {
                            acc = self.types.mk_app(acc, arg_ty);
                        }
                        acc
                    }
                }
            }

            AstKind::Constructor { conid, args } => {
                let AstKind::ConId { symbol, .. } = self.ast.kind(conid).clone() else {
                    return Err(CompileError::not_in_scope("_".to_string(), span));
                };
                let arg_tys = args
                    .iter()
                    .map(|&a| self.ast_to_type(a, var_env))
                    .collect::<Result<Vec<_>>>()?;
                let con = self.types.mk_con(symbol, arg_tys);
                crate::types::kind::kind_infer(self.types, self.symbols, self.base, con, span)?;
                con
            }

            AstKind::FunctionType { arg, result } => {
                let arg_ty = self.ast_to_type(arg, var_env)?;
                let result_ty = self.ast_to_type(result, var_env)?;
                let fn_ty = self.types.mk_fun(arg_ty, result_ty);
                self.types.get_mut(fn_ty).kind_of = Some(self.base.star_kind_ty);
                fn_ty
            }

            AstKind::Tuple { expressions } => {
                let element_tys = expressions
                    .iter()
                    .map(|&e| self.ast_to_type(e, var_env))
                    .collect::<Result<Vec<_>>>()?;
                let tuple_type = self
                    .base
                    .tuple_type(expressions.len())
                    .expect("tuple arity within 2..=10");
                let ty = self.types.mk_con(tuple_type, element_tys);
                self.types.get_mut(ty).kind_of = Some(self.base.star_kind_ty);
                ty
            }

            AstKind::Constant {
                value: Constant::Integer(n),
            } => {
                let nat = self.types.mk_nat(n as u64);
                self.types.get_mut(nat).kind_of = Some(self.base.nat_kind_ty);
                nat
            }

            AstKind::TypeAttribute {
                attributed_type,
                attribute,
            } => {
                // No nesting: an attribute over an attributed type is a
                // kind-level misuse.
                if matches!(
                    self.ast.kind(attributed_type),
                    AstKind::TypeAttribute { .. }
                ) {
                    return Err(CompileError::new(
                        CompileErrorKind::KindMismatch {
                            left: "Uniqueness".to_string(),
                            right: "Uniqueness".to_string(),
                        },
                        span,
                    ));
                }
                let inner = self.ast_to_type(attributed_type, var_env)?;
                let attributed = self.types.deep_copy(inner);
                let ownership = match attribute {
                    TypeAttributeKind::Unique => self.base.unique_ty,
                    TypeAttributeKind::Shared => self.base.shared_ty,
                };
                self.types.get_mut(attributed).ownership = Some(ownership);
                attributed
            }

            AstKind::SimpleType {
                type_con,
                type_vars,
            } => {
                let AstKind::ConId { symbol, .. } = self.ast.kind(type_con).clone() else {
                    return Err(CompileError::not_in_scope("_".to_string(), span));
                };
                let arg_tys = type_vars
                    .iter()
                    .map(|&v| self.ast_to_type(v, var_env))
                    .collect::<Result<Vec<_>>>()?;
                let con = self.types.mk_con(symbol, arg_tys);
                crate::types::kind::kind_infer(self.types, self.symbols, self.base, con, span)?;
                con
            }

            other => {
                return Err(CompileError::new(
                    CompileErrorKind::MismatchedType {
                        left: format!("{other:?}"),
                        right: "a type term".to_string(),
                    },
                    span,
                ));
            }
        };
        self.set_node_ty(id, ty);
        Ok(ty)
    }
}
