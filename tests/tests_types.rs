//! Unification, instantiation, and defaulting properties over the base
//! module's tables.

use necroc::base::SourceSpan;
use necroc::pipeline::Compilation;
use necroc::types::unify::TypeEnv;
use necroc::types::TypeId;
use necroc::CompileErrorKind;
use rstest::rstest;

fn with_env<R>(run: impl FnOnce(&mut TypeEnv<'_>, &BaseIds) -> R) -> R {
    let mut c = Compilation::with_base();
    let ids = BaseIds {
        int_ty: c.symbols.get(c.base.int_type).ty.unwrap(),
        float_ty: c.symbols.get(c.base.float_type).ty.unwrap(),
        bool_ty: c.symbols.get(c.base.bool_type).ty.unwrap(),
        maybe_con: c.base.maybe_type,
    };
    let mut env = TypeEnv {
        types: &mut c.types,
        symbols: &mut c.symbols,
        scopes: &c.scopes,
        classes: &c.classes,
        base: &c.base,
        interner: &mut c.interner,
    };
    run(&mut env, &ids)
}

struct BaseIds {
    int_ty: TypeId,
    float_ty: TypeId,
    bool_ty: TypeId,
    maybe_con: necroc::syntax::symbol::SymbolId,
}

#[test]
fn test_unify_binds_flex_var() {
    with_env(|env, ids| {
        let var = env.fresh_star_var(None);
        env.unify(var, ids.int_ty, None, SourceSpan::NULL)
            .expect("flex var binds");
        let root = env.types.find(var);
        assert_eq!(root, env.types.find_const(ids.int_ty));
    });
}

#[test]
fn test_unify_is_most_general() {
    // After unify(t1, t2) both sides render identically, and a remaining
    // variable stays free: the unifier did not over-commit.
    with_env(|env, ids| {
        let a = env.fresh_star_var(None);
        let b = env.fresh_star_var(None);
        // t1 = a -> Bool, t2 = Int -> b
        let t1 = env.types.mk_fun(a, ids.bool_ty);
        let t2 = env.types.mk_fun(ids.int_ty, b);
        env.unify(t1, t2, None, SourceSpan::NULL).expect("unifies");
        let left = env.types.display(t1, env.symbols);
        let right = env.types.display(t2, env.symbols);
        assert_eq!(left, right);
        assert_eq!(left, "Int -> Bool");
    });
}

#[test]
fn test_unify_head_mismatch() {
    with_env(|env, ids| {
        let err = env
            .unify(ids.int_ty, ids.bool_ty, None, SourceSpan::NULL)
            .expect_err("Int and Bool never unify");
        assert!(matches!(err.kind, CompileErrorKind::MismatchedType { .. }));
    });
}

#[test]
fn test_occurs_check() {
    with_env(|env, ids| {
        let var = env.fresh_star_var(None);
        let maybe_var = env.types.mk_con(ids.maybe_con, vec![var]);
        let err = env
            .unify(var, maybe_var, None, SourceSpan::NULL)
            .expect_err("infinite type rejected");
        assert!(matches!(err.kind, CompileErrorKind::OccursCheck { .. }));
    });
}

#[test]
fn test_rigid_vars_never_bind() {
    with_env(|env, ids| {
        let module = env.base.module_name.clone();
        let name = env.interner.intern("a");
        let symbol = env.symbols.fresh(name, module, SourceSpan::NULL);
        let rigid = env.types.mk_rigid_var(symbol, None);
        env.types.get_mut(rigid).kind_of = Some(env.base.star_kind_ty);
        let err = env
            .unify(rigid, ids.int_ty, None, SourceSpan::NULL)
            .expect_err("rigid var refuses to bind");
        assert!(matches!(
            err.kind,
            CompileErrorKind::RigidTypeVariable { .. }
        ));
    });
}

#[test]
fn test_instantiate_records_substitutions() {
    with_env(|env, _ids| {
        // The Num `add` method: forall a. Num a => a -> a -> a
        let add_ty = env.symbols.get(env.base.add).ty.unwrap();
        let (inst, subs) = env.instantiate(add_ty, None);
        assert_eq!(subs.len(), 1);
        assert!(env.types.is_polymorphic(inst));
        // The fresh var carries the class context forward.
        let fresh = env.types.find(subs[0].new_type);
        match env.types.term(fresh) {
            necroc::types::TypeTerm::Var(var) => {
                assert!(var.context.contains(&env.base.num_class));
            }
            other => panic!("expected fresh var, got {other:?}"),
        }
    });
}

#[rstest]
#[case::num_defaults_to_int(&["Num"], "Int")]
#[case::fractional_defaults_to_float(&["Num", "Fractional"], "Float")]
#[case::eq_ord_default_to_unit(&["Eq", "Ord"], "()")]
fn test_ambiguity_defaulting(#[case] classes: &[&str], #[case] expected: &str) {
    with_env(|env, _ids| {
        let var = env.fresh_star_var(None);
        let context: Vec<_> = classes
            .iter()
            .map(|name| match *name {
                "Num" => env.base.num_class,
                "Fractional" => env.base.fractional_class,
                "Eq" => env.base.eq_class,
                "Ord" => env.base.ord_class,
                other => panic!("unknown class {other}"),
            })
            .collect();
        match &mut env.types.get_mut(var).term {
            necroc::types::TypeTerm::Var(v) => v.context.extend(context),
            _ => unreachable!(),
        }
        assert!(env.default_type_var(var));
        let bound = env.types.find(var);
        assert_eq!(env.types.display(bound, env.symbols), expected);
    });
}

#[test]
fn test_ambiguity_check_rejects_unconstrained_var() {
    with_env(|env, _ids| {
        let var = env.fresh_star_var(None);
        let err = env
            .ambiguity_check(var, var, SourceSpan::NULL)
            .expect_err("bare flex var cannot default");
        assert!(matches!(
            err.kind,
            CompileErrorKind::AmbiguousTypeVariable { .. }
        ));
    });
}

#[test]
fn test_generalize_then_instantiate_round_trips() {
    with_env(|env, _ids| {
        let a = env.fresh_star_var(None);
        let fn_ty = env.types.mk_fun(a, a);
        let generalized = env.generalize(fn_ty, None);
        assert!(matches!(
            env.types.term(generalized),
            necroc::types::TypeTerm::For { .. }
        ));
        let (inst, subs) = env.instantiate(generalized, None);
        assert_eq!(subs.len(), 1);
        // The instantiated copy is a fresh arrow over one variable.
        let rendered = env.types.display(inst, env.symbols);
        assert_eq!(rendered, "a -> a");
    });
}

#[test]
fn test_type_deep_copy_idempotent() {
    with_env(|env, ids| {
        let maybe_int = env.types.mk_con(ids.maybe_con, vec![ids.int_ty]);
        let once = env.types.deep_copy(maybe_int);
        let twice = env.types.deep_copy(once);
        assert_eq!(
            env.types.display(once, env.symbols),
            env.types.display(twice, env.symbols)
        );
        assert_eq!(env.types.display(once, env.symbols), "Maybe Int");
    });
}

#[test]
fn test_mangling_injective_over_distinct_types() {
    with_env(|env, ids| {
        let maybe_int = env.types.mk_con(ids.maybe_con, vec![ids.int_ty]);
        let maybe_float = env.types.mk_con(ids.maybe_con, vec![ids.float_ty]);
        let nested = env.types.mk_con(ids.maybe_con, vec![maybe_int]);
        let names: Vec<String> = [maybe_int, maybe_float, nested]
            .iter()
            .map(|&t| env.types.mangled_string(t, env.symbols))
            .collect();
        assert_eq!(names[0], "Maybe<Int>");
        assert_eq!(names[2], "Maybe<Maybe<Int>>");
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 3);
    });
}
