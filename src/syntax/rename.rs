//! Scope building (phase B) and renaming (phase C).
//!
//! The scope builder creates a tree of scopes mirroring the AST, inserts
//! every binder, attaches type signatures to their bindings, and records
//! the enclosing scope on every node. The renamer then resolves each
//! occurrence to the lexically closest binding, rewriting the node's
//! placeholder symbol; unbound names are not-in-scope errors, and two
//! binders sharing a name in one scope are duplicate-declaration errors.

use crate::base::Symbol;
use crate::error::{CompileError, Result};
use crate::syntax::ast::{AstArena, AstId, AstKind, ConKind, SigKind, VarKind};
use crate::syntax::scope::{ScopeId, ScopeTable};
use crate::syntax::symbol::{SymbolId, SymbolTable};

// ----------------------------------------------------------------------
// Phase B: scope builder
// ----------------------------------------------------------------------

struct ScopeBuilder<'a> {
    ast: &'a mut AstArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a mut ScopeTable,
}

/// Build the scope tree and insert all binders.
pub fn build_scopes(
    ast: &mut AstArena,
    symbols: &mut SymbolTable,
    scopes: &mut ScopeTable,
) -> Result<()> {
    let Some(root) = ast.root else {
        return Ok(());
    };
    let mut builder = ScopeBuilder {
        ast,
        symbols,
        scopes,
    };
    let top = builder.scopes.top_term;
    builder.go(root, top)
}

impl<'a> ScopeBuilder<'a> {
    fn insert_checked(&mut self, scope: ScopeId, name: Symbol, symbol: SymbolId) -> Result<()> {
        if let Some(existing) = self.scopes.find_in_scope(scope, &name) {
            if existing != symbol {
                let span = self.symbols.get(symbol).span;
                return Err(CompileError::duplicate_declaration(
                    name.as_str().to_string(),
                    span,
                ));
            }
        }
        self.scopes.insert(scope, name, symbol);
        Ok(())
    }

    fn insert_type_checked(&mut self, name: Symbol, symbol: SymbolId) -> Result<()> {
        let top_type = self.scopes.top_type;
        self.insert_checked(top_type, name, symbol)
    }

    /// Insert the binders a declaration introduces at its level.
    fn insert_declaration_binders(&mut self, decl: AstId, scope: ScopeId) -> Result<()> {
        match self.ast.kind(decl).clone() {
            AstKind::SimpleAssignment { symbol, .. }
            | AstKind::ApatsAssignment { symbol, .. } => {
                let name = self.symbols.source_name(symbol).clone();
                self.insert_checked(scope, name, symbol)
            }
            AstKind::PatAssignment { pat, .. } => self.insert_pattern_binders(pat, scope),
            AstKind::DataDeclaration {
                symbol,
                constructors,
                ..
            } => {
                let name = self.symbols.source_name(symbol).clone();
                self.insert_type_checked(name, symbol)?;
                for con in constructors {
                    if let AstKind::Constructor { conid, .. } = self.ast.kind(con) {
                        if let AstKind::ConId { symbol, .. } = self.ast.kind(*conid) {
                            let symbol = *symbol;
                            let name = self.symbols.source_name(symbol).clone();
                            self.insert_checked(scope, name, symbol)?;
                        }
                    }
                }
                Ok(())
            }
            AstKind::TypeClassDeclaration {
                symbol,
                declarations,
                ..
            } => {
                let name = self.symbols.source_name(symbol).clone();
                self.insert_type_checked(name, symbol)?;
                // Method signatures bind method names at the top level.
                if let Some(declarations) = declarations {
                    if let AstKind::DeclarationList { declarations } =
                        self.ast.kind(declarations).clone()
                    {
                        for method_decl in declarations {
                            if let AstKind::TypeSignature {
                                var,
                                sig_kind: SigKind::ClassSig,
                                ..
                            } = self.ast.kind(method_decl)
                            {
                                if let AstKind::Variable { symbol, .. } = self.ast.kind(*var) {
                                    let symbol = *symbol;
                                    let name = self.symbols.source_name(symbol).clone();
                                    self.insert_checked(scope, name, symbol)?;
                                }
                            }
                        }
                    }
                }
                Ok(())
            }
            AstKind::TypeClassInstance { symbol, .. } => {
                let name = self.symbols.source_name(symbol).clone();
                self.insert_type_checked(name, symbol)
            }
            AstKind::TypeSignature { .. } => Ok(()),
            _ => Ok(()),
        }
    }

    fn insert_pattern_binders(&mut self, pat: AstId, scope: ScopeId) -> Result<()> {
        match self.ast.kind(pat).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                initializer,
                ..
            } => {
                let name = self.symbols.source_name(symbol).clone();
                self.insert_checked(scope, name, symbol)?;
                if let Some(initializer) = initializer {
                    self.go(initializer, scope)?;
                }
                Ok(())
            }
            AstKind::Wildcard | AstKind::Constant { .. } | AstKind::ConId { .. } => Ok(()),
            AstKind::Tuple { expressions }
            | AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions } => {
                for expr in expressions {
                    self.insert_pattern_binders(expr, scope)?;
                }
                Ok(())
            }
            AstKind::Constructor { args, .. } => {
                for arg in args {
                    self.insert_pattern_binders(arg, scope)?;
                }
                Ok(())
            }
            AstKind::BinOpSym { left, right, .. } => {
                self.insert_pattern_binders(left, scope)?;
                self.insert_pattern_binders(right, scope)
            }
            AstKind::App { function, argument } => {
                self.insert_pattern_binders(function, scope)?;
                self.insert_pattern_binders(argument, scope)
            }
            _ => Ok(()),
        }
    }

    /// Attach free-standing signatures to the bindings they describe.
    fn attach_signatures(&mut self, declarations: &[AstId], scope: ScopeId) -> Result<()> {
        for &decl in declarations {
            if let AstKind::TypeSignature {
                var,
                sig_kind: SigKind::TypeSig,
                ..
            } = self.ast.kind(decl)
            {
                let var = *var;
                if let AstKind::Variable { symbol, .. } = self.ast.kind(var).clone() {
                    let name = self.symbols.source_name(symbol).clone();
                    match self.scopes.find_in_scope(scope, &name) {
                        Some(bound) => {
                            self.symbols.get_mut(bound).optional_type_signature = Some(decl);
                            // The signature's var now names the binding.
                            if let AstKind::Variable { symbol, .. } =
                                &mut self.ast.get_mut(var).kind
                            {
                                *symbol = bound;
                            }
                        }
                        None => {
                            let span = self.ast.span(decl);
                            return Err(CompileError::not_in_scope(
                                name.as_str().to_string(),
                                span,
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Process a declaration list: insert all binders first (bindings at
    /// one level are mutually visible), then walk bodies.
    fn declaration_list(&mut self, declarations: &[AstId], scope: ScopeId) -> Result<()> {
        for &decl in declarations {
            self.insert_declaration_binders(decl, scope)?;
        }
        self.attach_signatures(declarations, scope)?;
        for &decl in declarations {
            self.go(decl, scope)?;
        }
        Ok(())
    }

    fn go(&mut self, id: AstId, scope: ScopeId) -> Result<()> {
        self.ast.get_mut(id).scope = Some(scope);
        match self.ast.kind(id).clone() {
            AstKind::TopDecl { declarations } | AstKind::DeclarationList { declarations } => {
                self.declaration_list(&declarations, scope)
            }
            AstKind::DeclarationGroupList { groups } => {
                for group in groups {
                    self.go(group, scope)?;
                }
                Ok(())
            }
            AstKind::DeclarationGroup { declarations } => {
                self.declaration_list(&declarations, scope)
            }

            AstKind::SimpleAssignment {
                initializer, rhs, ..
            } => {
                if let Some(initializer) = initializer {
                    self.go(initializer, scope)?;
                }
                self.go(rhs, scope)
            }

            AstKind::ApatsAssignment { apats, rhs, .. } => {
                let inner = self.scopes.enter_scope(scope);
                for &apat in &apats {
                    self.insert_pattern_binders(apat, inner)?;
                }
                for &apat in &apats {
                    self.go(apat, inner)?;
                }
                self.go(rhs, inner)
            }

            AstKind::PatAssignment { pat, rhs } => {
                self.go(pat, scope)?;
                self.go(rhs, scope)
            }

            AstKind::Rhs {
                expression,
                declarations,
            } => match declarations {
                Some(declarations) => {
                    let inner = self.scopes.enter_scope(scope);
                    self.go(declarations, inner)?;
                    self.go(expression, inner)
                }
                None => self.go(expression, scope),
            },

            AstKind::Lambda { apats, expression } => {
                let inner = self.scopes.enter_scope(scope);
                for &apat in &apats {
                    self.insert_pattern_binders(apat, inner)?;
                }
                for &apat in &apats {
                    self.go(apat, inner)?;
                }
                self.go(expression, inner)
            }

            AstKind::Let {
                declarations,
                expression,
            } => {
                let inner = self.scopes.enter_scope(scope);
                self.go(declarations, inner)?;
                self.go(expression, inner)
            }

            AstKind::CaseAlternative { pat, body } => {
                let inner = self.scopes.enter_scope(scope);
                self.insert_pattern_binders(pat, inner)?;
                self.go(pat, inner)?;
                self.go(body, inner)
            }

            AstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => {
                self.go(range_init, scope)?;
                self.go(value_init, scope)?;
                let inner = self.scopes.enter_scope(scope);
                self.insert_pattern_binders(index_apat, inner)?;
                self.insert_pattern_binders(value_apat, inner)?;
                self.go(index_apat, inner)?;
                self.go(value_apat, inner)?;
                self.go(expression, inner)
            }

            AstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => {
                self.go(value_init, scope)?;
                let inner = self.scopes.enter_scope(scope);
                self.insert_pattern_binders(value_apat, inner)?;
                self.go(value_apat, inner)?;
                self.go(while_expression, inner)?;
                self.go(do_expression, inner)
            }

            AstKind::Do { statements } => {
                let inner = self.scopes.enter_scope(scope);
                for statement in statements {
                    if let AstKind::BindAssignment { symbol, .. } = self.ast.kind(statement) {
                        let symbol = *symbol;
                        let name = self.symbols.source_name(symbol).clone();
                        self.insert_checked(inner, name, symbol)?;
                    }
                    if let AstKind::PatBindAssignment { pat, .. } = self.ast.kind(statement) {
                        let pat = *pat;
                        self.insert_pattern_binders(pat, inner)?;
                    }
                    self.go(statement, inner)?;
                }
                Ok(())
            }

            AstKind::TypeClassInstance { declarations, .. } => {
                if let Some(declarations) = declarations {
                    let inner = self.scopes.enter_scope(scope);
                    self.go(declarations, inner)?;
                }
                Ok(())
            }

            AstKind::TypeClassDeclaration { declarations, .. } => {
                if let Some(declarations) = declarations {
                    self.go(declarations, scope)?;
                }
                Ok(())
            }

            // Generic structural walk for everything else.
            _ => {
                for child in self.ast.children(id) {
                    self.go(child, scope)?;
                }
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------
// Phase C: renamer
// ----------------------------------------------------------------------

struct Renamer<'a> {
    ast: &'a mut AstArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
}

/// Resolve every occurrence to its binding.
pub fn rename(
    ast: &mut AstArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
) -> Result<()> {
    let Some(root) = ast.root else {
        return Ok(());
    };
    let mut renamer = Renamer {
        ast,
        symbols,
        scopes,
    };
    renamer.go(root)
}

impl<'a> Renamer<'a> {
    fn resolve_term(&self, name: &Symbol, scope: Option<ScopeId>, id: AstId) -> Result<SymbolId> {
        let scope = scope.unwrap_or(self.scopes.top_term);
        self.scopes.find(scope, name).ok_or_else(|| {
            CompileError::not_in_scope(name.as_str().to_string(), self.ast.span(id))
        })
    }

    fn resolve_type(&self, name: &Symbol, id: AstId) -> Result<SymbolId> {
        self.scopes.find(self.scopes.top_type, name).ok_or_else(|| {
            CompileError::not_in_scope(name.as_str().to_string(), self.ast.span(id))
        })
    }

    fn go(&mut self, id: AstId) -> Result<()> {
        let scope = self.ast.get(id).scope;
        match self.ast.kind(id).clone() {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Var,
                initializer,
                ..
            } => {
                let name = self.symbols.source_name(symbol).clone();
                let resolved = self.resolve_term(&name, scope, id)?;
                if let AstKind::Variable { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
                if let Some(initializer) = initializer {
                    self.go(initializer)?;
                }
                Ok(())
            }

            AstKind::ConId { symbol, con_kind } => {
                let resolved = match con_kind {
                    ConKind::Var | ConKind::Pattern => {
                        let name = self.symbols.source_name(symbol).clone();
                        // Constructors already bound stay put.
                        if self.symbols.get(symbol).is_constructor {
                            symbol
                        } else {
                            self.resolve_term(&name, scope, id)?
                        }
                    }
                    ConKind::TypeUse => {
                        let name = self.symbols.source_name(symbol).clone();
                        self.resolve_type(&name, id)?
                    }
                    ConKind::TypeDeclaration => symbol,
                };
                if let AstKind::ConId { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
                Ok(())
            }

            AstKind::BinOp { symbol, lhs, rhs, .. } => {
                let name = self.symbols.source_name(symbol).clone();
                let resolved = self.resolve_term(&name, scope, id)?;
                if let AstKind::BinOp { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
                self.go(lhs)?;
                self.go(rhs)
            }

            AstKind::OpLeftSection { symbol, left, .. } => {
                let name = self.symbols.source_name(symbol).clone();
                let resolved = self.resolve_term(&name, scope, id)?;
                if let AstKind::OpLeftSection { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
                self.go(left)
            }

            AstKind::OpRightSection { symbol, right, .. } => {
                let name = self.symbols.source_name(symbol).clone();
                let resolved = self.resolve_term(&name, scope, id)?;
                if let AstKind::OpRightSection { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
                self.go(right)
            }

            AstKind::BinOpSym { op, left, right } => {
                self.go(op)?;
                self.go(left)?;
                self.go(right)
            }

            AstKind::TypeClassInstance {
                class_conid, inst, context, declarations, ..
            } => {
                self.go(class_conid)?;
                self.go(inst)?;
                for ctx in context {
                    self.go(ctx)?;
                }
                if let Some(declarations) = declarations {
                    self.go(declarations)?;
                }
                Ok(())
            }

            // Everything else: structural walk.
            _ => {
                for child in self.ast.children(id) {
                    self.go(child)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Interner;
    use crate::syntax::parse_ast::ParseAstArena;
    use crate::syntax::reify::reify;

    fn setup(
        build: impl FnOnce(&mut ParseAstArena, &mut Interner),
    ) -> (AstArena, SymbolTable, ScopeTable, Result<()>) {
        let mut interner = Interner::new();
        let module = interner.intern("Main");
        let mut parse = ParseAstArena::new(module);
        build(&mut parse, &mut interner);
        let mut symbols = SymbolTable::new();
        let mut scopes = ScopeTable::new();
        let mut ast = reify(&parse, &mut interner, &mut symbols, AstArena::new());
        let result = build_scopes(&mut ast, &mut symbols, &mut scopes)
            .and_then(|_| rename(&mut ast, &mut symbols, &scopes));
        (ast, symbols, scopes, result)
    }

    #[test]
    fn test_resolves_to_binding() {
        let (ast, _symbols, _scopes, result) = setup(|parse, interner| {
            // x = y; y = x  (mutual references resolve)
            let x_name = interner.intern("x");
            let y_name = interner.intern("y");
            let y_use = parse.var(y_name.clone());
            let rhs_x = parse.rhs(y_use);
            let x_decl = parse.simple_assignment(x_name.clone(), rhs_x);
            let x_use = parse.var(x_name);
            let rhs_y = parse.rhs(x_use);
            let y_decl = parse.simple_assignment(y_name, rhs_y);
            parse.set_top_decl(vec![x_decl, y_decl]);
        });
        assert!(result.is_ok());
        assert!(ast.root.is_some());
    }

    #[test]
    fn test_not_in_scope() {
        let (_ast, _symbols, _scopes, result) = setup(|parse, interner| {
            let x_name = interner.intern("x");
            let missing = interner.intern("missing");
            let use_missing = parse.var(missing);
            let rhs = parse.rhs(use_missing);
            let decl = parse.simple_assignment(x_name, rhs);
            parse.set_top_decl(vec![decl]);
        });
        match result {
            Err(err) => assert!(err.to_string().contains("missing")),
            Ok(()) => panic!("expected not-in-scope error"),
        }
    }

    #[test]
    fn test_duplicate_declaration() {
        let (_ast, _symbols, _scopes, result) = setup(|parse, interner| {
            let x_name = interner.intern("x");
            let one = parse.int(1);
            let rhs1 = parse.rhs(one);
            let decl1 = parse.simple_assignment(x_name.clone(), rhs1);
            let two = parse.int(2);
            let rhs2 = parse.rhs(two);
            let decl2 = parse.simple_assignment(x_name, rhs2);
            parse.set_top_decl(vec![decl1, decl2]);
        });
        match result {
            Err(err) => assert!(err.to_string().contains("duplicate")),
            Ok(()) => panic!("expected duplicate-declaration error"),
        }
    }
}
