//! The kind system.
//!
//! Kinds are themselves type terms drawn from the kind constructors the
//! base module declares (`Type`, `Nat`, `Sym`, `Attribute`, `Uniqueness`,
//! `Kind`). Kind inference runs interleaved with type inference; free kind
//! variables default to `Type` at generalization.

use crate::base::SourceSpan;
use crate::error::{CompileError, CompileErrorKind, Result};
use crate::syntax::symbol::SymbolTable;
use crate::types::base_module::BaseModule;
use crate::types::{TypeArena, TypeId, TypeTerm};

/// Occurs check: `var` (a find-root var id) must not appear inside `ty`.
pub fn occurs(
    types: &mut TypeArena,
    var: TypeId,
    ty: TypeId,
    symbols: &SymbolTable,
    span: SourceSpan,
) -> Result<()> {
    let ty = types.find(ty);
    if ty == var {
        let var_str = types.display(var, symbols);
        let ty_str = types.display(ty, symbols);
        return Err(CompileError::new(
            CompileErrorKind::OccursCheck {
                var: var_str,
                ty: ty_str,
            },
            span,
        ));
    }
    match types.term(ty).clone() {
        TypeTerm::Var(_) | TypeTerm::Nat(_) | TypeTerm::Sym(_) => Ok(()),
        TypeTerm::App { left, right } => {
            occurs(types, var, left, symbols, span)?;
            occurs(types, var, right, symbols, span)
        }
        TypeTerm::Fun { arg, result } => {
            occurs(types, var, arg, symbols, span)?;
            occurs(types, var, result, symbols, span)
        }
        TypeTerm::Con { args, .. } => {
            for arg in args {
                occurs(types, var, arg, symbols, span)?;
            }
            Ok(())
        }
        TypeTerm::For { body, .. } => occurs(types, var, body, symbols, span),
    }
}

fn kind_mismatch(
    types: &TypeArena,
    symbols: &SymbolTable,
    left: TypeId,
    right: TypeId,
    span: SourceSpan,
) -> CompileError {
    CompileError::new(
        CompileErrorKind::KindMismatch {
            left: types.display(left, symbols),
            right: types.display(right, symbols),
        },
        span,
    )
}

/// Bind a flex kind var to a kind, respecting rigidity and scope depth.
fn bind_var(types: &mut TypeArena, var: TypeId, to: TypeId) {
    match &mut types.get_mut(var).term {
        TypeTerm::Var(v) => v.bound = Some(to),
        _ => unreachable!("bind_var on non-var"),
    }
}

/// Unify two kinds. Kinds never contain `For` binders or attribute terms.
pub fn kind_unify(
    types: &mut TypeArena,
    symbols: &SymbolTable,
    kind1: TypeId,
    kind2: TypeId,
    span: SourceSpan,
) -> Result<()> {
    let kind1 = types.find(kind1);
    let kind2 = types.find(kind2);
    if kind1 == kind2 {
        return Ok(());
    }
    let term1 = types.term(kind1).clone();
    let term2 = types.term(kind2).clone();
    match (&term1, &term2) {
        (TypeTerm::Var(v1), TypeTerm::Var(v2)) => {
            if v1.is_rigid && v2.is_rigid {
                return Err(CompileError::new(
                    CompileErrorKind::RigidTypeVariable {
                        var: types.display(kind1, symbols),
                        ty: types.display(kind2, symbols),
                    },
                    span,
                ));
            }
            occurs(types, kind1, kind2, symbols, span)?;
            if v1.is_rigid {
                bind_var(types, kind2, kind1);
            } else {
                bind_var(types, kind1, kind2);
            }
            Ok(())
        }
        (TypeTerm::Var(v1), _) => {
            if v1.is_rigid {
                return Err(CompileError::new(
                    CompileErrorKind::RigidTypeVariable {
                        var: types.display(kind1, symbols),
                        ty: types.display(kind2, symbols),
                    },
                    span,
                ));
            }
            occurs(types, kind1, kind2, symbols, span)?;
            bind_var(types, kind1, kind2);
            Ok(())
        }
        (_, TypeTerm::Var(v2)) => {
            if v2.is_rigid {
                return Err(CompileError::new(
                    CompileErrorKind::RigidTypeVariable {
                        var: types.display(kind2, symbols),
                        ty: types.display(kind1, symbols),
                    },
                    span,
                ));
            }
            occurs(types, kind2, kind1, symbols, span)?;
            bind_var(types, kind2, kind1);
            Ok(())
        }
        (
            TypeTerm::Fun { arg: a1, result: r1 },
            TypeTerm::Fun { arg: a2, result: r2 },
        ) => {
            kind_unify(types, symbols, *a1, *a2, span)?;
            kind_unify(types, symbols, *r1, *r2, span)
        }
        (TypeTerm::Con { symbol: s1, args: args1 }, TypeTerm::Con { symbol: s2, args: args2 }) => {
            if s1 != s2 {
                return Err(kind_mismatch(types, symbols, kind1, kind2, span));
            }
            if args1.len() != args2.len() {
                return Err(CompileError::new(
                    CompileErrorKind::KindMismatchedArity {
                        con: symbols.source_name(*s1).as_str().to_string(),
                        expected: args1.len(),
                        actual: args2.len(),
                    },
                    span,
                ));
            }
            for (&a1, &a2) in args1.iter().zip(args2.iter()) {
                kind_unify(types, symbols, a1, a2, span)?;
            }
            Ok(())
        }
        _ => Err(kind_mismatch(types, symbols, kind1, kind2, span)),
    }
}

/// Infer (and cache) the kind of a type term.
pub fn kind_infer(
    types: &mut TypeArena,
    symbols: &SymbolTable,
    base: &BaseModule,
    ty: TypeId,
    span: SourceSpan,
) -> Result<TypeId> {
    let ty = types.find(ty);
    if let Some(kind) = types.get(ty).kind_of {
        if !matches!(types.term(ty), TypeTerm::App { .. } | TypeTerm::Con { .. }) {
            return Ok(kind);
        }
    }
    match types.term(ty).clone() {
        TypeTerm::Var(_) => {
            let kind = match types.get(ty).kind_of {
                Some(kind) => kind,
                None => {
                    let fresh = types.mk_var(None, None);
                    types.get_mut(ty).kind_of = Some(fresh);
                    fresh
                }
            };
            Ok(kind)
        }
        TypeTerm::Fun { arg, result } => {
            let arg_kind = kind_infer(types, symbols, base, arg, span)?;
            kind_unify(types, symbols, base.star_kind_ty, arg_kind, span)?;
            let result_kind = kind_infer(types, symbols, base, result, span)?;
            kind_unify(types, symbols, base.star_kind_ty, result_kind, span)?;
            types.get_mut(ty).kind_of = Some(base.star_kind_ty);
            Ok(base.star_kind_ty)
        }
        TypeTerm::App { left, right } => {
            let left_kind = kind_infer(types, symbols, base, left, span)?;
            let right_kind = kind_infer(types, symbols, base, right, span)?;
            if let Some(kind) = types.get(ty).kind_of {
                return Ok(kind);
            }
            let result_kind = types.mk_var(None, None);
            let fn_kind = types.mk_fun(right_kind, result_kind);
            kind_unify(types, symbols, left_kind, fn_kind, span)?;
            let result_kind = types.find(result_kind);
            types.get_mut(ty).kind_of = Some(result_kind);
            Ok(result_kind)
        }
        TypeTerm::Con { symbol, args } => {
            let con_kind = symbols
                .get(symbol)
                .ty
                .and_then(|t| types.get(types.find_const(t)).kind_of)
                .unwrap_or(base.star_kind_ty);
            // The declared kind must be an arrow chain covering every
            // argument in the vector.
            let mut arg_kinds = Vec::with_capacity(args.len());
            for &arg in &args {
                arg_kinds.push(kind_infer(types, symbols, base, arg, span)?);
            }
            if let Some(kind) = types.get(ty).kind_of {
                return Ok(kind);
            }
            let mut expected = con_kind;
            for (i, &arg_kind) in arg_kinds.iter().enumerate() {
                expected = types.find(expected);
                match types.term(expected).clone() {
                    TypeTerm::Fun { arg, result } => {
                        kind_unify(types, symbols, arg, arg_kind, span)?;
                        expected = result;
                    }
                    _ => {
                        return Err(CompileError::new(
                            CompileErrorKind::KindMismatchedArity {
                                con: symbols.source_name(symbol).as_str().to_string(),
                                expected: i,
                                actual: args.len(),
                            },
                            span,
                        ));
                    }
                }
            }
            let result = types.find(expected);
            types.get_mut(ty).kind_of = Some(result);
            Ok(result)
        }
        TypeTerm::For { body, .. } => {
            let kind = kind_infer(types, symbols, base, body, span)?;
            types.get_mut(ty).kind_of = Some(kind);
            Ok(kind)
        }
        TypeTerm::Nat(_) => {
            types.get_mut(ty).kind_of = Some(base.nat_kind_ty);
            Ok(base.nat_kind_ty)
        }
        TypeTerm::Sym(_) => {
            types.get_mut(ty).kind_of = Some(base.sym_kind_ty);
            Ok(base.sym_kind_ty)
        }
    }
}

/// Default free kind variables to `Type`, in place.
pub fn kind_default(types: &mut TypeArena, base: &BaseModule, kind: TypeId) {
    let kind = types.find(kind);
    match types.term(kind).clone() {
        TypeTerm::Var(_) => {
            bind_var(types, kind, base.star_kind_ty);
        }
        TypeTerm::Fun { arg, result } => {
            kind_default(types, base, arg);
            kind_default(types, base, result);
        }
        TypeTerm::Con { args, .. } => {
            for arg in args {
                kind_default(types, base, arg);
            }
        }
        TypeTerm::App { left, right } => {
            kind_default(types, base, left);
            kind_default(types, base, right);
        }
        TypeTerm::For { .. } | TypeTerm::Nat(_) | TypeTerm::Sym(_) => {}
    }
}

/// Recursively infer and default the kinds of a whole type.
pub fn default_type_kinds(
    types: &mut TypeArena,
    symbols: &SymbolTable,
    base: &BaseModule,
    ty: TypeId,
    span: SourceSpan,
) -> Result<()> {
    let ty = types.find(ty);
    if types.get(ty).kind_of.is_none() {
        kind_infer(types, symbols, base, ty, span)?;
    }
    match types.term(ty).clone() {
        TypeTerm::Con { args, .. } => {
            for arg in args {
                default_type_kinds(types, symbols, base, arg, span)?;
            }
        }
        TypeTerm::Fun { arg, result } => {
            default_type_kinds(types, symbols, base, arg, span)?;
            default_type_kinds(types, symbols, base, result, span)?;
        }
        TypeTerm::App { left, right } => {
            default_type_kinds(types, symbols, base, left, span)?;
            default_type_kinds(types, symbols, base, right, span)?;
        }
        TypeTerm::For { body, .. } => {
            default_type_kinds(types, symbols, base, body, span)?;
        }
        TypeTerm::Var(_) | TypeTerm::Nat(_) | TypeTerm::Sym(_) => {}
    }
    if let Some(kind) = types.get(ty).kind_of {
        kind_default(types, base, kind);
    }
    Ok(())
}

/// Infer, default, and require kind `Type`.
pub fn infer_default_unify_with_star(
    types: &mut TypeArena,
    symbols: &SymbolTable,
    base: &BaseModule,
    ty: TypeId,
    span: SourceSpan,
) -> Result<()> {
    let kind = kind_infer(types, symbols, base, ty, span)?;
    default_type_kinds(types, symbols, base, ty, span)?;
    kind_unify(types, symbols, base.star_kind_ty, kind, span)
}

/// True when the type's kind is the given kind constructor.
fn kind_is(types: &TypeArena, ty: TypeId, con: crate::syntax::symbol::SymbolId) -> bool {
    let ty = types.find_const(ty);
    match types.get(ty).kind_of {
        Some(kind) => {
            let kind = types.find_const(kind);
            matches!(types.term(kind), TypeTerm::Con { symbol, .. } if *symbol == con)
        }
        None => false,
    }
}

pub fn kind_is_type(types: &TypeArena, base: &BaseModule, ty: TypeId) -> bool {
    kind_is(types, ty, base.star_kind)
}

pub fn kind_is_ownership(types: &TypeArena, base: &BaseModule, ty: TypeId) -> bool {
    kind_is(types, ty, base.ownership_kind)
}

pub fn kind_is_nat(types: &TypeArena, base: &BaseModule, ty: TypeId) -> bool {
    kind_is(types, ty, base.nat_kind)
}
