//! Alias sets and the ownership checker.
//!
//! Each non-copy binding carries an [`AliasSet`]: the symbols that may name
//! the same underlying storage. Sets start as singletons at declarations and
//! grow by union-merge through simple assignments, pattern bindings, and
//! case alternatives. The ownership checker walks applications: passing a
//! value into a parameter marked `Unique` consumes every symbol in the
//! value's alias set, and a second consumption is a uniqueness violation.
//!
//! Runs after inference; copy-ness and uniqueness both come from inferred
//! types.

use rustc_hash::FxHashSet;

use crate::error::{CompileError, CompileErrorKind, Result};
use crate::syntax::ast::{AstArena, AstId, AstKind, VarKind};
use crate::syntax::symbol::{SymbolId, SymbolTable};
use crate::types::base_module::BaseModule;
use crate::types::{TypeArena, TypeTerm};

/// Symbols that provably may share storage. Singleton until the first
/// merge.
#[derive(Clone, Debug, PartialEq)]
pub enum AliasSet {
    Singleton(SymbolId),
    Table(FxHashSet<SymbolId>),
}

impl AliasSet {
    pub fn singleton(symbol: SymbolId) -> Self {
        AliasSet::Singleton(symbol)
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        match self {
            AliasSet::Singleton(s) => *s == symbol,
            AliasSet::Table(table) => table.contains(&symbol),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AliasSet::Singleton(_) => 1,
            AliasSet::Table(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = SymbolId> + '_ {
        let singleton = match self {
            AliasSet::Singleton(s) => Some(*s),
            AliasSet::Table(_) => None,
        };
        let table = match self {
            AliasSet::Table(t) => Some(t.iter().copied()),
            AliasSet::Singleton(_) => None,
        };
        singleton.into_iter().chain(table.into_iter().flatten())
    }

    pub fn is_overlapping(&self, other: &AliasSet) -> bool {
        self.iter().any(|s| other.contains(s))
    }

    /// Union of two sets. Idempotent: `union(A, A) = A`.
    pub fn union(&self, other: &AliasSet) -> AliasSet {
        let mut table: FxHashSet<SymbolId> = self.iter().collect();
        table.extend(other.iter());
        AliasSet::Table(table)
    }
}

/// Merge in assignment position. An untracked left side (copy type) stays
/// untracked; an untracked right side keeps the left set.
pub fn merge(lhs: Option<&AliasSet>, rhs: Option<&AliasSet>) -> Option<AliasSet> {
    match (lhs, rhs) {
        (None, rhs) => rhs.cloned(),
        (Some(_), None) => None,
        (Some(a), Some(b)) => Some(a.union(b)),
    }
}

/// Union of many optional sets.
pub fn merge_many(sets: &[Option<AliasSet>]) -> Option<AliasSet> {
    let mut table: FxHashSet<SymbolId> = FxHashSet::default();
    let mut any = false;
    for set in sets.iter().flatten() {
        any = true;
        table.extend(set.iter());
    }
    if any { Some(AliasSet::Table(table)) } else { None }
}

// ----------------------------------------------------------------------
// The analysis pass
// ----------------------------------------------------------------------

struct AliasAnalysis<'a> {
    ast: &'a AstArena,
    symbols: &'a mut SymbolTable,
    types: &'a TypeArena,
    base: &'a BaseModule,
    /// Symbols whose storage has been consumed by a unique parameter.
    consumed: FxHashSet<SymbolId>,
}

/// Run alias analysis and the ownership checker over the whole module.
pub fn alias_analysis(
    ast: &AstArena,
    symbols: &mut SymbolTable,
    types: &TypeArena,
    base: &BaseModule,
) -> Result<()> {
    let Some(root) = ast.root else {
        return Ok(());
    };
    let mut analysis = AliasAnalysis {
        ast,
        symbols,
        types,
        base,
        consumed: FxHashSet::default(),
    };
    analysis.go(root)?;
    Ok(())
}

impl<'a> AliasAnalysis<'a> {
    fn is_copy_type(&self, node: AstId) -> bool {
        match self.ast.ty(node) {
            Some(ty) => self.types.is_copy_type(ty, self.symbols),
            None => false,
        }
    }

    fn is_unique(&self, ty: crate::types::TypeId) -> bool {
        let ty = self.types.find_const(ty);
        match self.types.get(ty).ownership {
            Some(ownership) => {
                let ownership = self.types.find_const(ownership);
                matches!(
                    self.types.term(ownership),
                    TypeTerm::Con { symbol, .. } if *symbol == self.base.ownership_unique
                )
            }
            None => false,
        }
    }

    fn go(&mut self, id: AstId) -> Result<Option<AliasSet>> {
        match self.ast.kind(id).clone() {
            AstKind::TopDecl { declarations }
            | AstKind::DeclarationList { declarations }
            | AstKind::DeclarationGroup { declarations } => {
                for decl in declarations {
                    self.go(decl)?;
                }
                Ok(None)
            }
            AstKind::DeclarationGroupList { groups } => {
                for group in groups {
                    self.go(group)?;
                }
                Ok(None)
            }
            AstKind::TypeClassInstance { declarations, .. } => {
                if let Some(declarations) = declarations {
                    self.go(declarations)?;
                }
                Ok(None)
            }

            AstKind::Variable {
                symbol, var_kind, ..
            } => match var_kind {
                VarKind::Declaration => {
                    // Initializers are static time, should never alias.
                    let set = if self.is_copy_type(id) {
                        None
                    } else {
                        Some(AliasSet::singleton(symbol))
                    };
                    self.symbols.get_mut(symbol).alias_set = set.clone();
                    Ok(set)
                }
                VarKind::Var => {
                    let set = self.symbols.get(symbol).alias_set.clone();
                    if let Some(set) = &set {
                        if set.iter().any(|s| self.consumed.contains(&s)) {
                            let name = self.symbols.source_name(symbol).as_str().to_string();
                            return Err(CompileError::new(
                                CompileErrorKind::UniquenessViolation { name },
                                self.ast.span(id),
                            ));
                        }
                    }
                    Ok(set)
                }
                _ => Ok(None),
            },

            AstKind::SimpleAssignment { symbol, rhs, .. } => {
                let own_set = match self.symbols.get(symbol).ty {
                    Some(ty) if self.types.is_copy_type(ty, self.symbols) => None,
                    _ => Some(AliasSet::singleton(symbol)),
                };
                self.symbols.get_mut(symbol).alias_set = own_set.clone();
                let rhs_set = self.go(rhs)?;
                self.symbols.get_mut(symbol).alias_set =
                    merge(rhs_set.as_ref(), own_set.as_ref());
                Ok(None)
            }

            AstKind::ApatsAssignment {
                symbol, apats, rhs, ..
            } => {
                for apat in apats {
                    self.pat(apat, None)?;
                }
                let rhs_set = self.go(rhs)?;
                self.symbols.get_mut(symbol).alias_set = rhs_set;
                Ok(None)
            }

            AstKind::PatAssignment { pat, rhs } => {
                let rhs_set = self.go(rhs)?;
                self.pat(pat, rhs_set.as_ref())?;
                Ok(None)
            }

            AstKind::Lambda { apats, expression } => {
                for apat in apats {
                    self.pat(apat, None)?;
                }
                self.go(expression)
            }

            AstKind::Case {
                expression,
                alternatives,
            } => {
                let expr_set = self.go(expression)?;
                let mut sets = vec![expr_set.clone()];
                for alt in alternatives {
                    let AstKind::CaseAlternative { pat, body } = self.ast.kind(alt).clone() else {
                        continue;
                    };
                    self.pat(pat, expr_set.as_ref())?;
                    sets.push(self.go(body)?);
                }
                Ok(merge_many(&sets))
            }

            AstKind::App { .. } => self.apply(id),

            // No bin-ops currently consume their arguments.
            AstKind::BinOp { lhs, rhs, .. } => {
                let set1 = self.go(lhs)?;
                let set2 = self.go(rhs)?;
                Ok(merge_many(&[set1, set2]))
            }
            AstKind::OpLeftSection { left, .. } => self.go(left),
            AstKind::OpRightSection { right, .. } => self.go(right),

            AstKind::IfThenElse {
                if_expr,
                then_expr,
                else_expr,
            } => {
                self.go(if_expr)?;
                let set1 = self.go(then_expr)?;
                let set2 = self.go(else_expr)?;
                Ok(merge_many(&[set1, set2]))
            }

            AstKind::ArithmeticSequence { from, then, to } => {
                let mut sets = vec![self.go(from)?];
                if let Some(then) = then {
                    sets.push(self.go(then)?);
                }
                if let Some(to) = to {
                    sets.push(self.go(to)?);
                }
                Ok(merge_many(&sets))
            }

            AstKind::Rhs {
                expression,
                declarations,
            } => {
                if let Some(declarations) = declarations {
                    self.go(declarations)?;
                }
                self.go(expression)
            }

            AstKind::Let {
                declarations,
                expression,
            } => {
                self.go(declarations)?;
                self.go(expression)
            }

            AstKind::Tuple { expressions }
            | AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions }
            | AstKind::PatExpression { expressions }
            | AstKind::SeqExpression { expressions } => {
                let mut sets = Vec::with_capacity(expressions.len());
                for expr in expressions {
                    sets.push(self.go(expr)?);
                }
                Ok(merge_many(&sets))
            }

            AstKind::Do { statements } => {
                let mut sets = Vec::with_capacity(statements.len());
                for statement in statements {
                    sets.push(self.go(statement)?);
                }
                Ok(merge_many(&sets))
            }
            AstKind::BindAssignment { expression, .. } => self.go(expression),
            AstKind::PatBindAssignment { pat, expression } => {
                let set = self.go(expression)?;
                self.pat(pat, set.as_ref())?;
                Ok(None)
            }

            AstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => {
                self.go(range_init)?;
                let init_set = self.go(value_init)?;
                self.pat(index_apat, None)?;
                self.pat(value_apat, init_set.as_ref())?;
                self.go(expression)
            }
            AstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => {
                let init_set = self.go(value_init)?;
                self.pat(value_apat, init_set.as_ref())?;
                self.go(while_expression)?;
                self.go(do_expression)
            }

            // Nothing to track in type terms, signatures, and constants.
            AstKind::ConId { .. }
            | AstKind::Wildcard
            | AstKind::Constant { .. }
            | AstKind::DataDeclaration { .. }
            | AstKind::TypeClassDeclaration { .. }
            | AstKind::TypeSignature { .. }
            | AstKind::TypeClassContext { .. }
            | AstKind::SimpleType { .. }
            | AstKind::TypeApp { .. }
            | AstKind::FunctionType { .. }
            | AstKind::TypeAttribute { .. }
            | AstKind::Constructor { .. }
            | AstKind::BinOpSym { .. }
            | AstKind::CaseAlternative { .. } => Ok(None),
        }
    }

    /// Pattern walk: variables bound in a pattern join the incoming set.
    fn pat(&mut self, id: AstId, incoming: Option<&AliasSet>) -> Result<()> {
        match self.ast.kind(id).clone() {
            AstKind::Constant { .. } | AstKind::Wildcard | AstKind::ConId { .. } => Ok(()),
            AstKind::Tuple { expressions }
            | AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions } => {
                for expr in expressions {
                    self.pat(expr, incoming)?;
                }
                Ok(())
            }
            AstKind::Constructor { args, .. } => {
                for arg in args {
                    self.pat(arg, incoming)?;
                }
                Ok(())
            }
            AstKind::BinOpSym { left, right, .. } => {
                self.pat(left, incoming)?;
                self.pat(right, incoming)
            }
            AstKind::Variable { symbol, .. } => {
                let var_set = self.go(id)?;
                self.symbols.get_mut(symbol).alias_set = merge(var_set.as_ref(), incoming);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Application spine: consume arguments passed to unique parameters.
    fn apply(&mut self, id: AstId) -> Result<Option<AliasSet>> {
        // Collect the spine innermost-first.
        let mut args = Vec::new();
        let mut head = id;
        while let AstKind::App { function, argument } = self.ast.kind(head) {
            args.push(*argument);
            head = *function;
        }
        args.reverse();

        // Parameter ownership comes from the callee's environment type,
        // not from unification at the call site.
        let param_types = match self.ast.kind(head) {
            AstKind::Variable { symbol, .. } => match self.symbols.get(*symbol).ty {
                Some(ty) => {
                    let stripped = self.types.strip_for_all(ty);
                    self.types.fun_args(stripped)
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        self.go(head)?;

        for (i, &arg) in args.iter().enumerate() {
            let arg_set = self.go(arg)?;
            let param_unique = param_types
                .get(i)
                .map(|&ty| self.is_unique(ty))
                .unwrap_or(false);
            if param_unique {
                if let Some(set) = arg_set {
                    for symbol in set.iter() {
                        if !self.consumed.insert(symbol) {
                            let name =
                                self.symbols.source_name(symbol).as_str().to_string();
                            return Err(CompileError::new(
                                CompileErrorKind::UniquenessViolation { name },
                                self.ast.span(arg),
                            ));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Interner, SourceSpan};

    fn symbols_with(n: usize) -> (SymbolTable, Vec<SymbolId>) {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new();
        let module = interner.intern("Main");
        let ids = (0..n)
            .map(|i| {
                let name = interner.intern(&format!("s{i}"));
                table.fresh(name, module.clone(), SourceSpan::NULL)
            })
            .collect();
        (table, ids)
    }

    #[test]
    fn test_union_is_idempotent() {
        let (_table, ids) = symbols_with(2);
        let a = AliasSet::singleton(ids[0]).union(&AliasSet::singleton(ids[1]));
        assert_eq!(a.union(&a), a);
    }

    #[test]
    fn test_union_contains_both_sides() {
        let (_table, ids) = symbols_with(3);
        let a = AliasSet::singleton(ids[0]);
        let b = AliasSet::singleton(ids[1]).union(&AliasSet::singleton(ids[2]));
        let merged = a.union(&b);
        for &id in &ids {
            assert!(merged.contains(id));
            assert!(a.contains(id) || b.contains(id));
        }
    }

    #[test]
    fn test_merge_asymmetry() {
        let (_table, ids) = symbols_with(1);
        let set = AliasSet::singleton(ids[0]);
        // Untracked left side stays untracked.
        assert_eq!(merge(Some(&set), None), None);
        // Untracked right side adopts the left set.
        assert_eq!(merge(None, Some(&set)), Some(set.clone()));
    }

    #[test]
    fn test_overlap() {
        let (_table, ids) = symbols_with(3);
        let a = AliasSet::singleton(ids[0]).union(&AliasSet::singleton(ids[1]));
        let b = AliasSet::singleton(ids[1]).union(&AliasSet::singleton(ids[2]));
        let c = AliasSet::singleton(ids[2]);
        assert!(a.is_overlapping(&b));
        assert!(!a.is_overlapping(&c));
    }
}
