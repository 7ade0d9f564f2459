//! Monomorphization (phase F).
//!
//! Driven by the instantiation substitutions inference recorded at every
//! use site. A use of a polymorphic declaration whose substitutions are
//! ground clones the declaration under a type-mangled name
//! (`name<Int,Float>`), rewrites the clone's types through the
//! substitution, appends it to the same declaration group, and repoints
//! the use site. Class-method uses resolve through the instance for the
//! constructor the class variable maps to, then specialize the instance
//! binding the same way. Residual flex variables go through ambiguity
//! defaulting; a variable that will not default is an error here.
//!
//! After this phase no polymorphic value (other than constructor
//! functions and primitives) is reachable from a monomorphic root.

use rustc_hash::FxHashMap;

use crate::base::{Interner, SourceSpan};
use crate::error::{CompileError, CompileErrorKind, Result};
use crate::syntax::ast::{AstArena, AstId, AstKind, InstSub, VarKind};
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::{AstSymbol, SymbolId, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::unify::TypeEnv;
use crate::types::{TypeArena, TypeId, TypeTerm};

struct Monomorphize<'a> {
    ast: &'a mut AstArena,
    types: &'a mut TypeArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
    classes: &'a ClassTable,
    base: &'a BaseModule,
    interner: &'a mut Interner,
    /// (generic symbol, mangled suffix) -> specialized symbol.
    specializations: FxHashMap<(SymbolId, String), SymbolId>,
}

/// Monomorphize the module in place.
pub fn monomorphize(
    ast: &mut AstArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
    types: &mut TypeArena,
    classes: &ClassTable,
    base: &BaseModule,
    interner: &mut Interner,
) -> Result<()> {
    let Some(root) = ast.root else {
        return Ok(());
    };
    let mut mono = Monomorphize {
        ast,
        types,
        symbols,
        scopes,
        classes,
        base,
        interner,
        specializations: FxHashMap::default(),
    };
    mono.go(root)
}

impl<'a> Monomorphize<'a> {
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

    fn go(&mut self, id: AstId) -> Result<()> {
        match self.ast.kind(id).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Var,
                inst_subs,
                initializer,
            } => {
                if let Some(initializer) = initializer {
                    self.go(initializer)?;
                }
                self.rewrite_use(id, symbol, &inst_subs)
            }
            AstKind::BinOp {
                symbol,
                lhs,
                rhs,
                inst_subs,
            } => {
                self.rewrite_use(id, symbol, &inst_subs)?;
                self.go(lhs)?;
                self.go(rhs)
            }
            AstKind::OpLeftSection {
                symbol,
                left,
                inst_subs,
            } => {
                self.rewrite_use(id, symbol, &inst_subs)?;
                self.go(left)
            }
            AstKind::OpRightSection {
                symbol,
                right,
                inst_subs,
            } => {
                self.rewrite_use(id, symbol, &inst_subs)?;
                self.go(right)
            }
            _ => {
                for child in self.ast.children(id) {
                    self.go(child)?;
                }
                Ok(())
            }
        }
    }

    /// Resolve a use site to a specialized (or instance) symbol.
    fn rewrite_use(&mut self, id: AstId, symbol: SymbolId, inst_subs: &[InstSub]) -> Result<()> {
        if inst_subs.is_empty() {
            return Ok(());
        }
        let span = self.ast.span(id);

        // Ground every substitution by defaulting residual flex vars. A
        // substitution that stays polymorphic names a rigid variable of
        // an enclosing generic declaration; the use site is left for the
        // specialized clones, where the substitution is ground.
        let mut subs = Vec::with_capacity(inst_subs.len());
        for sub in inst_subs {
            let new_type = self.types.find(sub.new_type);
            let still_poly = self
                .env()
                .unambiguous_poly_check(new_type, new_type, span)?;
            if still_poly {
                return Ok(());
            }
            let new_type = self.types.find(new_type);
            subs.push(InstSub {
                var_to_replace: sub.var_to_replace,
                new_type,
            });
        }

        // Methods route through the instance for the class variable's
        // constructor first. The class variable is always the outermost
        // quantifier of a method type, so its substitution leads the
        // instantiation order.
        let mut target = symbol;
        let mut remaining = subs;
        if let Some(class_id) = self.symbols.get(symbol).method_type_class {
            let class = self.classes.class(class_id);
            let class_var = class.class_var;
            let class_symbol = class.class_symbol;
            let Some(class_sub) = remaining.first().copied() else {
                return Err(CompileError::new(
                    CompileErrorKind::AmbiguousTypeVariable {
                        var: self.symbols.source_name(class_var).as_str().to_string(),
                        ty: self.types.display(class_sub_ty_or(self, id), self.symbols),
                    },
                    span,
                ));
            };
            let head = self.types.find(class_sub.new_type);
            let head = self.types.uncurry_app(head);
            let head_symbol = match self.types.term(self.types.find_const(head)) {
                TypeTerm::Con { symbol, .. } => *symbol,
                _ => {
                    return Err(CompileError::new(
                        CompileErrorKind::AmbiguousTypeVariable {
                            var: self.symbols.source_name(class_var).as_str().to_string(),
                            ty: self.types.display(head, self.symbols),
                        },
                        span,
                    ));
                }
            };
            let Some(instance_id) = self.classes.find_instance(class_symbol, head_symbol) else {
                return Err(CompileError::new(
                    CompileErrorKind::MissingInstance {
                        class: self
                            .symbols
                            .source_name(class_symbol)
                            .as_str()
                            .to_string(),
                        ty: self.symbols.source_name(head_symbol).as_str().to_string(),
                    },
                    span,
                ));
            };
            let Some(binding) = self.classes.instance(instance_id).method_binding(symbol) else {
                return Err(CompileError::new(
                    CompileErrorKind::MissingInstance {
                        class: self
                            .symbols
                            .source_name(class_symbol)
                            .as_str()
                            .to_string(),
                        ty: self.symbols.source_name(head_symbol).as_str().to_string(),
                    },
                    span,
                ));
            };
            target = binding;
            remaining.remove(0);
        }

        // Specialize the (possibly instance-resolved) target.
        let final_symbol = {
            let target_ty = self.symbols.get(target).ty;
            let is_poly = target_ty
                .map(|ty| self.types.is_polymorphic(ty))
                .unwrap_or(false);
            let has_ast = self.symbols.get(target).ast.is_some();
            let is_constructor = self.symbols.get(target).is_constructor;
            if is_poly && has_ast && !is_constructor {
                self.specialize(target, &remaining, span)?
            } else {
                target
            }
        };

        if final_symbol != symbol {
            match &mut self.ast.get_mut(id).kind {
                AstKind::Variable {
                    symbol, inst_subs, ..
                }
                | AstKind::BinOp {
                    symbol, inst_subs, ..
                }
                | AstKind::OpLeftSection {
                    symbol, inst_subs, ..
                }
                | AstKind::OpRightSection {
                    symbol, inst_subs, ..
                } => {
                    *symbol = final_symbol;
                    inst_subs.clear();
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Clone `symbol`'s declaration under a mangled name with `subs`
    /// applied, interning one clone per distinct substitution.
    fn specialize(
        &mut self,
        symbol: SymbolId,
        subs: &[InstSub],
        span: SourceSpan,
    ) -> Result<SymbolId> {
        let generic_ty = self.symbols.get(symbol).ty.expect("declaration typed");

        // Collect binders in quantifier order and pair each with its
        // ground replacement; substitutions sharing a binder merge by
        // taking the first.
        let mut binder_order = Vec::new();
        let mut ty = self.types.find(generic_ty);
        while let TypeTerm::For { var, body, .. } = self.types.term(ty).clone() {
            binder_order.push(var);
            ty = self.types.find(body);
        }
        let mut type_map: FxHashMap<SymbolId, TypeId> = FxHashMap::default();
        let mut suffix = String::from("<");
        for (i, &binder) in binder_order.iter().enumerate() {
            let sub = subs.iter().find(|s| s.var_to_replace == binder);
            let Some(sub) = sub else {
                return Err(CompileError::new(
                    CompileErrorKind::AmbiguousTypeVariable {
                        var: self.symbols.source_name(binder).as_str().to_string(),
                        ty: self.types.display(generic_ty, self.symbols),
                    },
                    span,
                ));
            };
            let new_type = self.types.find(sub.new_type);
            if self.types.is_polymorphic(new_type) {
                return Err(CompileError::new(
                    CompileErrorKind::AmbiguousTypeVariable {
                        var: self.symbols.source_name(binder).as_str().to_string(),
                        ty: self.types.display(new_type, self.symbols),
                    },
                    span,
                ));
            }
            if i > 0 {
                suffix.push(',');
            }
            suffix.push_str(&self.types.mangled_string(new_type, self.symbols));
            type_map.insert(binder, new_type);
        }
        suffix.push('>');

        if let Some(&existing) = self.specializations.get(&(symbol, suffix.clone())) {
            return Ok(existing);
        }

        // Fresh specialized symbol.
        let source_name = self.symbols.source_name(symbol).clone();
        let mangled = self
            .interner
            .intern(&format!("{}{}", source_name.as_str(), suffix));
        let module_name = self.symbols.get(symbol).module_name.clone();
        let decl_span = self.symbols.get(symbol).span;
        let mut specialized = AstSymbol::new(mangled, source_name, module_name, decl_span);
        {
            let original = self.symbols.get(symbol);
            specialized.is_recursive = original.is_recursive;
            specialized.arity = original.arity;
            specialized.state_type = original.state_type;
            specialized.optional_type_signature = original.optional_type_signature;
        }
        let specialized_id = self.symbols.insert(specialized);
        let specialized_ty = self.env().replace_with_subs(generic_ty, &type_map);
        self.symbols.get_mut(specialized_id).ty = Some(specialized_ty);
        self.specializations
            .insert((symbol, suffix), specialized_id);

        // Deep-copy the declaration with fresh local binders.
        let decl = self.symbols.get(symbol).ast.expect("declaration present");
        let mut symbol_map: FxHashMap<SymbolId, SymbolId> = FxHashMap::default();
        symbol_map.insert(symbol, specialized_id);
        let clone = self.copy_with_subs(decl, &type_map, &mut symbol_map);
        self.symbols.get_mut(specialized_id).ast = Some(clone);

        // Append the clone to the original's declaration group.
        if let Some(group) = self.symbols.get(symbol).declaration_group {
            if let AstKind::DeclarationGroup { declarations } = &mut self.ast.get_mut(group).kind
            {
                declarations.push(clone);
            }
            self.symbols.get_mut(specialized_id).declaration_group = Some(group);
        }

        // Recursively monomorphize the specialized copy.
        self.go(clone)?;
        Ok(specialized_id)
    }

    /// Structural AST copy with type substitution. Binders get fresh
    /// symbols; occurrences follow the accumulated mapping.
    fn copy_with_subs(
        &mut self,
        id: AstId,
        type_map: &FxHashMap<SymbolId, TypeId>,
        symbol_map: &mut FxHashMap<SymbolId, SymbolId>,
    ) -> AstId {
        // Binders first, so forward references inside the subtree land on
        // the fresh symbols.
        self.clone_binders(id, type_map, symbol_map);
        self.copy_node(id, type_map, symbol_map)
    }

    fn clone_binders(
        &mut self,
        id: AstId,
        type_map: &FxHashMap<SymbolId, TypeId>,
        symbol_map: &mut FxHashMap<SymbolId, SymbolId>,
    ) {
        let binder = match self.ast.kind(id) {
            AstKind::SimpleAssignment { symbol, .. }
            | AstKind::ApatsAssignment { symbol, .. }
            | AstKind::BindAssignment { symbol, .. } => Some(*symbol),
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                ..
            } => Some(*symbol),
            _ => None,
        };
        if let Some(old) = binder {
            if !symbol_map.contains_key(&old) {
                let original = self.symbols.get(old).clone();
                let mut fresh = AstSymbol::new(
                    original.name.clone(),
                    original.source_name.clone(),
                    original.module_name.clone(),
                    original.span,
                );
                fresh.is_recursive = original.is_recursive;
                fresh.arity = original.arity;
                fresh.is_constructor = original.is_constructor;
                fresh.is_enum = original.is_enum;
                fresh.con_num = original.con_num;
                let fresh_id = self.symbols.insert(fresh);
                let new_ty = original
                    .ty
                    .map(|ty| self.env().replace_with_subs(ty, type_map));
                self.symbols.get_mut(fresh_id).ty = new_ty;
                symbol_map.insert(old, fresh_id);
            }
        }
        for child in self.ast.children(id) {
            self.clone_binders(child, type_map, symbol_map);
        }
    }

    fn copy_node(
        &mut self,
        id: AstId,
        type_map: &FxHashMap<SymbolId, TypeId>,
        symbol_map: &mut FxHashMap<SymbolId, SymbolId>,
    ) -> AstId {
        let span = self.ast.span(id);
        let scope = self.ast.get(id).scope;
        let old_ty = self.ast.ty(id);
        let mut kind = self.ast.kind(id).clone();

        // Rewrite children.
        macro_rules! cp {
            ($child:expr) => {
                *$child = self.copy_node(*$child, type_map, symbol_map)
            };
        }
        macro_rules! cp_vec {
            ($children:expr) => {
                for child in $children.iter_mut() {
                    *child = self.copy_node(*child, type_map, symbol_map);
                }
            };
        }
        macro_rules! cp_opt {
            ($child:expr) => {
                if let Some(child) = $child.as_mut() {
                    *child = self.copy_node(*child, type_map, symbol_map);
                }
            };
        }
        match &mut kind {
            AstKind::TopDecl { declarations }
            | AstKind::DeclarationList { declarations }
            | AstKind::DeclarationGroup { declarations } => cp_vec!(declarations),
            AstKind::DeclarationGroupList { groups } => cp_vec!(groups),
            AstKind::SimpleAssignment {
                symbol,
                initializer,
                rhs,
                ..
            } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp_opt!(initializer);
                cp!(rhs);
            }
            AstKind::ApatsAssignment {
                symbol, apats, rhs, ..
            } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp_vec!(apats);
                cp!(rhs);
            }
            AstKind::PatAssignment { pat, rhs } => {
                cp!(pat);
                cp!(rhs);
            }
            AstKind::Rhs {
                expression,
                declarations,
            } => {
                cp_opt!(declarations);
                cp!(expression);
            }
            AstKind::Variable {
                symbol, initializer, inst_subs, ..
            } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp_opt!(initializer);
                for sub in inst_subs.iter_mut() {
                    sub.new_type = {
                        let replaced = self.env().replace_with_subs(sub.new_type, type_map);
                        replaced
                    };
                }
            }
            AstKind::BinOp {
                symbol,
                lhs,
                rhs,
                inst_subs,
            } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp!(lhs);
                cp!(rhs);
                for sub in inst_subs.iter_mut() {
                    sub.new_type = self.env().replace_with_subs(sub.new_type, type_map);
                }
            }
            AstKind::OpLeftSection {
                symbol,
                left,
                inst_subs,
            } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp!(left);
                for sub in inst_subs.iter_mut() {
                    sub.new_type = self.env().replace_with_subs(sub.new_type, type_map);
                }
            }
            AstKind::OpRightSection {
                symbol,
                right,
                inst_subs,
            } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp!(right);
                for sub in inst_subs.iter_mut() {
                    sub.new_type = self.env().replace_with_subs(sub.new_type, type_map);
                }
            }
            AstKind::BindAssignment { symbol, expression } => {
                *symbol = symbol_map.get(symbol).copied().unwrap_or(*symbol);
                cp!(expression);
            }
            AstKind::PatBindAssignment { pat, expression } => {
                cp!(pat);
                cp!(expression);
            }
            AstKind::ConId { .. } | AstKind::Constant { .. } | AstKind::Wildcard => {}
            AstKind::Constructor { conid, args } => {
                cp!(conid);
                cp_vec!(args);
            }
            AstKind::App { function, argument } => {
                cp!(function);
                cp!(argument);
            }
            AstKind::BinOpSym { op, left, right } => {
                cp!(op);
                cp!(left);
                cp!(right);
            }
            AstKind::IfThenElse {
                if_expr,
                then_expr,
                else_expr,
            } => {
                cp!(if_expr);
                cp!(then_expr);
                cp!(else_expr);
            }
            AstKind::Lambda { apats, expression } => {
                cp_vec!(apats);
                cp!(expression);
            }
            AstKind::Let {
                declarations,
                expression,
            } => {
                cp!(declarations);
                cp!(expression);
            }
            AstKind::Case {
                expression,
                alternatives,
            } => {
                cp!(expression);
                cp_vec!(alternatives);
            }
            AstKind::CaseAlternative { pat, body } => {
                cp!(pat);
                cp!(body);
            }
            AstKind::Tuple { expressions }
            | AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions }
            | AstKind::PatExpression { expressions }
            | AstKind::SeqExpression { expressions } => cp_vec!(expressions),
            AstKind::ArithmeticSequence { from, then, to } => {
                cp!(from);
                cp_opt!(then);
                cp_opt!(to);
            }
            AstKind::Do { statements } => cp_vec!(statements),
            AstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => {
                cp!(range_init);
                cp!(value_init);
                cp!(index_apat);
                cp!(value_apat);
                cp!(expression);
            }
            AstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => {
                cp!(value_init);
                cp!(value_apat);
                cp!(while_expression);
                cp!(do_expression);
            }
            AstKind::TypeSignature { .. }
            | AstKind::DataDeclaration { .. }
            | AstKind::TypeClassDeclaration { .. }
            | AstKind::TypeClassInstance { .. }
            | AstKind::TypeClassContext { .. }
            | AstKind::SimpleType { .. }
            | AstKind::TypeApp { .. }
            | AstKind::FunctionType { .. }
            | AstKind::TypeAttribute { .. } => {}
        }

        let new_id = self.ast.alloc(kind, span);
        self.ast.get_mut(new_id).scope = scope;
        if let Some(old_ty) = old_ty {
            let new_ty = self.env().replace_with_subs(old_ty, type_map);
            self.ast.set_ty(new_id, new_ty);
        }
        new_id
    }
}

/// Fallback type for the ambiguous-class-variable diagnostic.
fn class_sub_ty_or(mono: &Monomorphize<'_>, id: AstId) -> TypeId {
    mono.ast
        .ty(id)
        .unwrap_or_else(|| mono.symbols.get(mono.base.unit_type).ty.expect("unit typed"))
}
