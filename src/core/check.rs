//! Core type sanity checking.
//!
//! A lightweight bottom-up re-derivation of every Core node's type,
//! unified against what translation recorded. Run after translation and
//! again after defunctionalization to catch rewrite bugs before they
//! reach code generation.

use crate::core::{CoreArena, CoreId, CoreKind, CoreLiteral, CoreSymbolTable, LoopKind};
use crate::error::Result;
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::SymbolTable;
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::unify::TypeEnv;
use crate::types::{TypeArena, TypeId, TypeTerm};

struct CoreCheck<'a> {
    core: &'a CoreArena,
    core_symbols: &'a CoreSymbolTable,
    types: &'a mut TypeArena,
    symbols: &'a mut SymbolTable,
    scopes: &'a ScopeTable,
    classes: &'a ClassTable,
    base: &'a BaseModule,
    interner: &'a mut crate::base::Interner,
}

/// Re-derive and verify the type of every node reachable from the root.
pub fn check(
    core: &CoreArena,
    core_symbols: &CoreSymbolTable,
    types: &mut TypeArena,
    symbols: &mut SymbolTable,
    scopes: &ScopeTable,
    classes: &ClassTable,
    base: &BaseModule,
    interner: &mut crate::base::Interner,
) -> Result<()> {
    let Some(root) = core.root else {
        return Ok(());
    };
    let mut checker = CoreCheck {
        core,
        core_symbols,
        types,
        symbols,
        scopes,
        classes,
        base,
        interner,
    };
    checker.go(root)?;
    Ok(())
}

impl<'a> CoreCheck<'a> {
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

    fn prim_ty(&self, symbol: crate::syntax::symbol::SymbolId) -> TypeId {
        self.symbols.get(symbol).ty.expect("base symbol typed")
    }

    fn go(&mut self, id: CoreId) -> Result<Option<TypeId>> {
        let span = crate::base::SourceSpan::NULL;
        match self.core.kind(id).clone() {
            CoreKind::Lit { value } => Ok(Some(match value {
                CoreLiteral::Int(_) => self.prim_ty(self.base.int_type),
                CoreLiteral::UInt(_) => self.prim_ty(self.base.uint_type),
                CoreLiteral::Float(_) => self.prim_ty(self.base.float_type),
                CoreLiteral::Char(_) => self.prim_ty(self.base.char_type),
                CoreLiteral::String(s) => {
                    let len = self.types.mk_nat(s.as_str().len() as u64 + 1);
                    self.types.get_mut(len).kind_of = Some(self.base.nat_kind_ty);
                    let char_ty = self.prim_ty(self.base.char_type);
                    let array = self
                        .types
                        .mk_con(self.base.array_type, vec![len, char_ty]);
                    self.types.get_mut(array).kind_of = Some(self.base.star_kind_ty);
                    array
                }
                CoreLiteral::Array(elements) => {
                    let elem = self.env().fresh_star_var(None);
                    for &element in &elements {
                        if let Some(element_ty) = self.go(element)? {
                            self.env().unify(elem, element_ty, None, span)?;
                        }
                    }
                    let len = self.types.mk_nat(elements.len() as u64);
                    self.types.get_mut(len).kind_of = Some(self.base.nat_kind_ty);
                    let array = self.types.mk_con(self.base.array_type, vec![len, elem]);
                    self.types.get_mut(array).kind_of = Some(self.base.star_kind_ty);
                    array
                }
            })),

            CoreKind::Var { symbol } => {
                let sym_ty = self.core_symbols.get(symbol).ty;
                match sym_ty {
                    Some(ty) => {
                        // Constructor vars instantiate fresh; everything
                        // else is already monomorphic.
                        let ty = if matches!(
                            self.types.term(self.types.find_const(ty)),
                            TypeTerm::For { .. }
                        ) {
                            let (inst, _) = self.env().instantiate(ty, None);
                            inst
                        } else {
                            ty
                        };
                        if let Some(node_ty) = self.core.ty(id) {
                            self.env().unify(node_ty, ty, None, span)?;
                        }
                        Ok(Some(ty))
                    }
                    None => Ok(self.core.ty(id)),
                }
            }

            CoreKind::App { function, argument } => {
                let fn_ty = self.go(function)?;
                let arg_ty = self.go(argument)?;
                match (fn_ty, arg_ty) {
                    (Some(fn_ty), Some(arg_ty)) => {
                        let result = self.env().fresh_star_var(None);
                        let expected = self.types.mk_fun(arg_ty, result);
                        self.env().unify(fn_ty, expected, None, span)?;
                        Ok(Some(self.types.find(result)))
                    }
                    _ => Ok(self.core.ty(id)),
                }
            }

            CoreKind::Lam { arg, body } => {
                let arg_ty = self.go(arg)?;
                let body_ty = self.go(body)?;
                match (arg_ty, body_ty) {
                    (Some(arg_ty), Some(body_ty)) => {
                        Ok(Some(self.types.mk_fun(arg_ty, body_ty)))
                    }
                    _ => Ok(self.core.ty(id)),
                }
            }

            CoreKind::Let { bind, body } => {
                self.go(bind)?;
                match body {
                    Some(body) => self.go(body),
                    None => Ok(None),
                }
            }

            CoreKind::Bind {
                symbol,
                expr,
                initializer,
            } => {
                let expr_ty = self.go(expr)?;
                if let Some(initializer) = initializer {
                    self.go(initializer)?;
                }
                if let (Some(expr_ty), Some(sym_ty)) =
                    (expr_ty, self.core_symbols.get(symbol).ty)
                {
                    self.env().unify(sym_ty, expr_ty, None, span)?;
                }
                Ok(expr_ty)
            }

            CoreKind::BindRec { binds } => {
                for bind in binds {
                    self.go(bind)?;
                }
                Ok(None)
            }

            CoreKind::Case { expr, alts } => {
                let scrutinee_ty = self.go(expr)?;
                let result = self.env().fresh_star_var(None);
                for alt in alts {
                    let CoreKind::CaseAlt { pat, body } = self.core.kind(alt).clone() else {
                        continue;
                    };
                    if let (Some(pat), Some(scrutinee_ty)) = (pat, scrutinee_ty) {
                        if let Some(pat_ty) = self.go(pat)? {
                            self.env().unify(scrutinee_ty, pat_ty, None, span)?;
                        }
                    }
                    if let Some(body_ty) = self.go(body)? {
                        self.env().unify(result, body_ty, None, span)?;
                    }
                }
                Ok(Some(self.types.find(result)))
            }

            CoreKind::CaseAlt { pat, body } => {
                if let Some(pat) = pat {
                    self.go(pat)?;
                }
                self.go(body)
            }

            CoreKind::DataDecl { .. } | CoreKind::DataCon { .. } => Ok(None),

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
                        self.go(index_pat)?;
                        self.go(range_init)?;
                    }
                    LoopKind::While { condition } => {
                        if let Some(cond_ty) = self.go(condition)? {
                            let bool_ty = self.prim_ty(self.base.bool_type);
                            self.env().unify(cond_ty, bool_ty, None, span)?;
                        }
                    }
                }
                let value_ty = self.go(value_pat)?;
                let init_ty = self.go(value_init)?;
                let body_ty = self.go(body)?;
                if let (Some(value_ty), Some(init_ty)) = (value_ty, init_ty) {
                    self.env().unify(value_ty, init_ty, None, span)?;
                }
                if let (Some(value_ty), Some(body_ty)) = (value_ty, body_ty) {
                    self.env().unify(value_ty, body_ty, None, span)?;
                }
                Ok(body_ty)
            }
        }
    }
}
