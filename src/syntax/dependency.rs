//! Dependency analysis (phase D).
//!
//! Tarjan's strongly-connected-component algorithm over the declarations
//! of each level (the top level and every let/where list). Each level's
//! source-ordered declaration list is replaced in place by a
//! `DeclarationGroupList`: SCCs in topological order, so later groups may
//! depend only on earlier ones. A group with more than one declaration is
//! a mutually recursive nest.
//!
//! Visits happen in the prescribed pass order - data declarations, class
//! and instance declarations, type signatures, then terms - so groups of
//! type-level declarations come out ahead of the values that use them.
//! A back edge onto the DFS stack marks the source declaration (and its
//! binder) recursive. Instance declarations carry a forced dependency on
//! every super-class instance, looked up by the concatenated
//! `Class@Data` symbol.

use rustc_hash::FxHashMap;

use crate::base::Interner;
use crate::syntax::ast::{AstArena, AstId, AstKind, SigKind, VarKind};
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::{SymbolId, SymbolTable};

struct LevelState {
    /// Binder symbol -> position of its declaration in `decls`.
    binders: FxHashMap<SymbolId, usize>,
    index: Vec<Option<usize>>,
    low_link: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    /// Completed SCCs, each a list of declaration positions.
    components: Vec<Vec<usize>>,
}

struct DependencyAnalyzer<'a> {
    ast: &'a mut AstArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
    interner: &'a mut Interner,
}

/// Run dependency analysis over the module, restructuring every
/// declaration level into a topologically ordered group list.
pub fn dependency_analyze(
    ast: &mut AstArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
    interner: &mut Interner,
) {
    let Some(root) = ast.root else {
        return;
    };
    let mut analyzer = DependencyAnalyzer {
        ast,
        symbols,
        scopes,
        interner,
    };
    analyzer.analyze_level(root);
}

impl<'a> DependencyAnalyzer<'a> {
    /// Analyze one declaration level, then recurse into nested levels.
    fn analyze_level(&mut self, level: AstId) {
        let decls = match self.ast.kind(level) {
            AstKind::TopDecl { declarations } | AstKind::DeclarationList { declarations } => {
                declarations.clone()
            }
            _ => return,
        };

        // Pass 1: record every binder of this level.
        let mut state = LevelState {
            binders: FxHashMap::default(),
            index: vec![None; decls.len()],
            low_link: vec![0; decls.len()],
            on_stack: vec![false; decls.len()],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        };
        for (pos, &decl) in decls.iter().enumerate() {
            for binder in self.declaration_binders(decl) {
                state.binders.insert(binder, pos);
            }
        }

        // Passes 2-5: data declarations, classes/instances, signatures,
        // terms. Signatures that attach to a binding are folded into the
        // binding's visit, so free-standing ones come last among types.
        let pass_of = |kind: &AstKind| -> usize {
            match kind {
                AstKind::DataDeclaration { .. } => 0,
                AstKind::TypeClassDeclaration { .. } | AstKind::TypeClassInstance { .. } => 1,
                AstKind::TypeSignature { .. } => 2,
                _ => 3,
            }
        };
        for pass in 0..4 {
            for (pos, &decl) in decls.iter().enumerate() {
                if pass_of(self.ast.kind(decl)) == pass && state.index[pos].is_none() {
                    self.visit(&decls, pos, &mut state);
                }
            }
        }

        // Rebuild the level as a group list in completion order.
        let mut groups = Vec::with_capacity(state.components.len());
        let span = self.ast.span(level);
        for component in &state.components {
            let mut members: Vec<AstId> = component.iter().map(|&pos| decls[pos]).collect();
            // Keep source order within a group.
            members.sort_by_key(|id| id.index());
            let group = self.ast.alloc(
                AstKind::DeclarationGroup {
                    declarations: members.clone(),
                },
                span,
            );
            let scope = self.ast.get(level).scope;
            self.ast.get_mut(group).scope = scope;
            for &member in &members {
                for binder in self.declaration_binders(member) {
                    self.symbols.get_mut(binder).declaration_group = Some(group);
                }
            }
            groups.push(group);
        }
        self.ast.get_mut(level).kind = AstKind::DeclarationGroupList { groups };

        // Recurse into nested declaration levels.
        for &decl in &decls {
            self.analyze_nested(decl);
        }
    }

    fn analyze_nested(&mut self, id: AstId) {
        match self.ast.kind(id).clone() {
            AstKind::Let { declarations, expression } => {
                self.analyze_level(declarations);
                self.analyze_nested(expression);
            }
            AstKind::Rhs {
                expression,
                declarations,
            } => {
                if let Some(declarations) = declarations {
                    self.analyze_level(declarations);
                }
                self.analyze_nested(expression);
            }
            AstKind::TypeClassInstance { declarations, .. }
            | AstKind::TypeClassDeclaration { declarations, .. } => {
                if let Some(declarations) = declarations {
                    self.analyze_level(declarations);
                }
            }
            _ => {
                for child in self.ast.children(id) {
                    self.analyze_nested(child);
                }
            }
        }
    }

    /// Binder symbols a declaration introduces.
    fn declaration_binders(&self, decl: AstId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        match self.ast.kind(decl) {
            AstKind::SimpleAssignment { symbol, .. }
            | AstKind::ApatsAssignment { symbol, .. }
            | AstKind::TypeClassInstance { symbol, .. } => out.push(*symbol),
            AstKind::PatAssignment { pat, .. } => self.pattern_binders(*pat, &mut out),
            AstKind::DataDeclaration {
                symbol,
                constructors,
                ..
            } => {
                out.push(*symbol);
                for &con in constructors {
                    if let AstKind::Constructor { conid, .. } = self.ast.kind(con) {
                        if let AstKind::ConId { symbol, .. } = self.ast.kind(*conid) {
                            out.push(*symbol);
                        }
                    }
                }
            }
            AstKind::TypeClassDeclaration {
                symbol,
                declarations,
                ..
            } => {
                out.push(*symbol);
                if let Some(declarations) = declarations {
                    if let AstKind::DeclarationList { declarations } = self.ast.kind(*declarations)
                    {
                        for &method in declarations {
                            if let AstKind::TypeSignature {
                                var,
                                sig_kind: SigKind::ClassSig,
                                ..
                            } = self.ast.kind(method)
                            {
                                if let AstKind::Variable { symbol, .. } = self.ast.kind(*var) {
                                    out.push(*symbol);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        out
    }

    fn pattern_binders(&self, pat: AstId, out: &mut Vec<SymbolId>) {
        match self.ast.kind(pat) {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Declaration,
                ..
            } => out.push(*symbol),
            _ => {
                for child in self.ast.children(pat) {
                    self.pattern_binders(child, out);
                }
            }
        }
    }

    /// Symbols a declaration references, in structural order. Includes the
    /// attached type signature and, for instances, the forced super-class
    /// instance symbols.
    fn dependencies(&mut self, decl: AstId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        match self.ast.kind(decl).clone() {
            AstKind::SimpleAssignment { symbol, .. } | AstKind::ApatsAssignment { symbol, .. } => {
                if let Some(sig) = self.symbols.get(symbol).optional_type_signature {
                    self.collect_refs(sig, &mut out);
                }
                self.collect_refs(decl, &mut out);
            }
            AstKind::TypeClassInstance {
                class_conid, inst, ..
            } => {
                self.collect_super_instance_refs(class_conid, inst, &mut out);
                self.collect_refs(decl, &mut out);
            }
            _ => self.collect_refs(decl, &mut out),
        }
        out
    }

    fn collect_refs(&self, id: AstId, out: &mut Vec<SymbolId>) {
        match self.ast.kind(id) {
            AstKind::Variable {
                symbol,
                var_kind: VarKind::Var,
                ..
            } => out.push(*symbol),
            AstKind::ConId { symbol, .. } => out.push(*symbol),
            AstKind::BinOp { symbol, .. }
            | AstKind::OpLeftSection { symbol, .. }
            | AstKind::OpRightSection { symbol, .. } => out.push(*symbol),
            _ => {}
        }
        for child in self.ast.children(id) {
            self.collect_refs(child, out);
        }
    }

    /// `instance C T` depends on `Super@T` for every super-class of `C`.
    fn collect_super_instance_refs(&mut self, class_conid: AstId, inst: AstId, out: &mut Vec<SymbolId>) {
        let AstKind::ConId { symbol: class_symbol, .. } = self.ast.kind(class_conid) else {
            return;
        };
        let class_symbol = *class_symbol;
        let data_name = self.instance_head_symbol(inst);
        let Some(data_name) = data_name else { return };

        // Super classes come from the class declaration's context.
        let Some(class_ast) = self.symbols.get(class_symbol).ast else {
            return;
        };
        let AstKind::TypeClassDeclaration { context, .. } = self.ast.kind(class_ast).clone()
        else {
            return;
        };
        for ctx in context {
            let AstKind::TypeClassContext { class_conid, .. } = self.ast.kind(ctx) else {
                continue;
            };
            let AstKind::ConId { symbol: super_symbol, .. } = self.ast.kind(*class_conid) else {
                continue;
            };
            let super_name = self.symbols.source_name(*super_symbol).clone();
            let instance_name = self
                .interner
                .intern(&format!("{}@{}", super_name.as_str(), data_name.as_str()));
            if let Some(instance_symbol) =
                self.scopes.find(self.scopes.top_type, &instance_name)
            {
                out.push(instance_symbol);
            }
        }
    }

    fn instance_head_symbol(&self, inst: AstId) -> Option<crate::base::Symbol> {
        match self.ast.kind(inst) {
            AstKind::ConId { symbol, .. } => {
                Some(self.symbols.source_name(*symbol).clone())
            }
            AstKind::Constructor { conid, .. } | AstKind::SimpleType { type_con: conid, .. } => {
                match self.ast.kind(*conid) {
                    AstKind::ConId { symbol, .. } => {
                        Some(self.symbols.source_name(*symbol).clone())
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Tarjan visit.
    fn visit(&mut self, decls: &[AstId], pos: usize, state: &mut LevelState) {
        state.index[pos] = Some(state.next_index);
        state.low_link[pos] = state.next_index;
        state.next_index += 1;
        state.stack.push(pos);
        state.on_stack[pos] = true;

        for dep in self.dependencies(decls[pos]) {
            let Some(&target) = state.binders.get(&dep) else {
                continue;
            };
            if target == pos {
                // Direct self reference.
                self.mark_recursive(decls[pos]);
                continue;
            }
            match state.index[target] {
                None => {
                    self.visit(decls, target, state);
                    state.low_link[pos] = state.low_link[pos].min(state.low_link[target]);
                }
                Some(target_index) => {
                    if state.on_stack[target] {
                        state.low_link[pos] = state.low_link[pos].min(target_index);
                        self.mark_recursive(decls[pos]);
                    }
                }
            }
        }

        if state.low_link[pos] == state.index[pos].unwrap() {
            let mut component = Vec::new();
            loop {
                let member = state.stack.pop().expect("stack underflow in SCC pop");
                state.on_stack[member] = false;
                component.push(member);
                if member == pos {
                    break;
                }
            }
            component.reverse();
            state.components.push(component);
        }
    }

    /// A back edge marks the declaration (and its binder) recursive.
    fn mark_recursive(&mut self, decl: AstId) {
        let binders = self.declaration_binders(decl);
        match &mut self.ast.get_mut(decl).kind {
            AstKind::SimpleAssignment { is_recursive, .. }
            | AstKind::ApatsAssignment { is_recursive, .. }
            | AstKind::DataDeclaration { is_recursive, .. } => *is_recursive = true,
            _ => return,
        }
        for binder in binders {
            self.symbols.get_mut(binder).is_recursive = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Interner;
    use crate::syntax::parse_ast::ParseAstArena;
    use crate::syntax::reify::reify;
    use crate::syntax::rename::{build_scopes, rename};

    fn analyzed(
        build: impl FnOnce(&mut ParseAstArena, &mut Interner),
    ) -> (AstArena, SymbolTable) {
        let mut interner = Interner::new();
        let module = interner.intern("Main");
        let mut parse = ParseAstArena::new(module);
        build(&mut parse, &mut interner);
        let mut symbols = SymbolTable::new();
        let mut scopes = ScopeTable::new();
        // Register fromInt so literal wrapping resolves.
        let base_mod = interner.intern("Necro.Base");
        let from_int_name = interner.intern("fromInt");
        let from_int = symbols.fresh(from_int_name.clone(), base_mod, crate::base::SourceSpan::NULL);
        let top = scopes.top_term;
        scopes.insert(top, from_int_name, from_int);

        let mut ast = reify(&parse, &mut interner, &mut symbols, AstArena::new());
        build_scopes(&mut ast, &mut symbols, &mut scopes).unwrap();
        rename(&mut ast, &mut symbols, &scopes).unwrap();
        dependency_analyze(&mut ast, &mut symbols, &scopes, &mut interner);
        (ast, symbols)
    }

    fn group_members(ast: &AstArena, group: AstId) -> Vec<AstId> {
        match ast.kind(group) {
            AstKind::DeclarationGroup { declarations } => declarations.clone(),
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn test_topological_order() {
        // b = a; a = 1  =>  group(a) before group(b)
        let (ast, symbols) = analyzed(|parse, interner| {
            let a_name = interner.intern("a");
            let b_name = interner.intern("b");
            let a_use = parse.var(a_name.clone());
            let rhs_b = parse.rhs(a_use);
            let b_decl = parse.simple_assignment(b_name, rhs_b);
            let one = parse.int(1);
            let rhs_a = parse.rhs(one);
            let a_decl = parse.simple_assignment(a_name, rhs_a);
            parse.set_top_decl(vec![b_decl, a_decl]);
        });
        let root = ast.root.unwrap();
        let AstKind::DeclarationGroupList { groups } = ast.kind(root) else {
            panic!("expected group list at root");
        };
        assert_eq!(groups.len(), 2);
        let first = group_members(&ast, groups[0]);
        let AstKind::SimpleAssignment { symbol, .. } = ast.kind(first[0]) else {
            panic!("expected assignment");
        };
        assert_eq!(symbols.source_name(*symbol).as_str(), "a");
    }

    #[test]
    fn test_mutual_recursion_one_group() {
        let (ast, symbols) = analyzed(|parse, interner| {
            let a_name = interner.intern("a");
            let b_name = interner.intern("b");
            let b_use = parse.var(b_name.clone());
            let rhs_a = parse.rhs(b_use);
            let a_decl = parse.simple_assignment(a_name.clone(), rhs_a);
            let a_use = parse.var(a_name);
            let rhs_b = parse.rhs(a_use);
            let b_decl = parse.simple_assignment(b_name, rhs_b);
            parse.set_top_decl(vec![a_decl, b_decl]);
        });
        let root = ast.root.unwrap();
        let AstKind::DeclarationGroupList { groups } = ast.kind(root) else {
            panic!("expected group list at root");
        };
        assert_eq!(groups.len(), 1);
        assert_eq!(group_members(&ast, groups[0]).len(), 2);
        // Both binders are marked recursive members of one nest.
        let recursive = symbols
            .iter()
            .filter(|(_, s)| s.is_recursive)
            .count();
        assert!(recursive >= 1);
    }

    #[test]
    fn test_self_recursion_marked() {
        let (ast, symbols) = analyzed(|parse, interner| {
            let x_name = interner.intern("x");
            let x_use = parse.var(x_name.clone());
            let rhs = parse.rhs(x_use);
            let decl = parse.simple_assignment(x_name, rhs);
            parse.set_top_decl(vec![decl]);
        });
        let root = ast.root.unwrap();
        let AstKind::DeclarationGroupList { groups } = ast.kind(root) else {
            panic!("expected group list");
        };
        let members = group_members(&ast, groups[0]);
        match ast.kind(members[0]) {
            AstKind::SimpleAssignment {
                symbol,
                is_recursive,
                ..
            } => {
                assert!(*is_recursive);
                assert!(symbols.get(*symbol).is_recursive);
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }
}
