//! End-to-end pipeline scenarios: parse-tree in, state-classified Core
//! out.

use necroc::base::{CompileOptions, Interner, Phase};
use necroc::core::{CoreAstSymbol, CoreKind, CoreSymbolId};
use necroc::pipeline::{compile, Compilation};
use necroc::syntax::parse_ast::{ParseAstArena, ParseAstKind};
use necroc::syntax::symbol::StateType;
use necroc::base::SourceSpan;

fn compile_module(
    build: impl FnOnce(&mut ParseAstArena, &mut Interner),
) -> Compilation {
    compile_module_with(build, CompileOptions::default()).expect("pipeline succeeds")
}

fn compile_module_with(
    build: impl FnOnce(&mut ParseAstArena, &mut Interner),
    options: CompileOptions,
) -> Result<Compilation, necroc::CompileError> {
    let mut interner = Interner::new();
    let module = interner.intern("Main");
    let mut parse = ParseAstArena::new(module);
    build(&mut parse, &mut interner);
    compile(&parse, &options)
}

fn find_core_symbol<'a>(
    c: &'a Compilation,
    name: &str,
) -> Option<(CoreSymbolId, &'a CoreAstSymbol)> {
    c.core_symbols.iter().find(|(_, s)| s.name.as_str() == name)
}

fn top_chain_symbols(c: &Compilation) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = c.core.root;
    while let Some(id) = current {
        let CoreKind::Let { bind, body } = c.core.kind(id) else {
            break;
        };
        match c.core.kind(*bind) {
            CoreKind::Bind { symbol, .. } | CoreKind::DataDecl { symbol, .. } => {
                out.push(c.core_symbols.name(*symbol).as_str().to_string());
            }
            CoreKind::BindRec { binds } => {
                for &inner in binds {
                    if let CoreKind::Bind { symbol, .. } = c.core.kind(inner) {
                        out.push(c.core_symbols.name(*symbol).as_str().to_string());
                    }
                }
            }
            _ => {}
        }
        current = *body;
    }
    out
}

// ----------------------------------------------------------------------
// Scenario: x = True
// ----------------------------------------------------------------------

#[test]
fn test_constant_bool_binding() {
    let c = compile_module(|parse, interner| {
        let x = interner.intern("x");
        let true_con = interner.intern("True");
        let rhs_expr = parse.conid(true_con);
        let rhs = parse.rhs(rhs_expr);
        let decl = parse.simple_assignment(x, rhs);
        parse.set_top_decl(vec![decl]);
    });

    let (_, x_sym) = find_core_symbol(&c, "x").expect("x lowered to core");
    assert_eq!(x_sym.state_type, StateType::Constant);
    let bind = x_sym.ast.expect("x has a bind");
    let CoreKind::Bind { expr, initializer, .. } = c.core.kind(bind) else {
        panic!("expected bind for x");
    };
    assert!(initializer.is_none());
    let CoreKind::Var { symbol } = c.core.kind(*expr) else {
        panic!("expected constructor var on the right-hand side");
    };
    assert_eq!(c.core_symbols.name(*symbol).as_str(), "True");
    let ty = x_sym.ty.expect("x typed");
    assert_eq!(c.types.display(ty, &c.symbols), "Bool");
}

// ----------------------------------------------------------------------
// Scenario: counter = let x ~ 0 = x + 1 in x
// ----------------------------------------------------------------------

#[test]
fn test_recursive_initialized_value_is_stateful() {
    let c = compile_module(|parse, interner| {
        let counter = interner.intern("counter");
        let x = interner.intern("x");
        let plus = interner.intern("+");
        let int_ty = interner.intern("Int");

        let sig_ty = parse.type_con(int_ty);
        let sig = parse.type_signature(counter.clone(), sig_ty);

        let zero = parse.int(0);
        let x_use = parse.var(x.clone());
        let one = parse.int(1);
        let sum = parse.bin_op(plus, x_use, one);
        let x_rhs = parse.rhs(sum);
        let x_decl = parse.initialized_assignment(x.clone(), zero, x_rhs);
        let body = parse.var(x);
        let let_expr = parse.let_expr(vec![x_decl], body);
        let counter_rhs = parse.rhs(let_expr);
        let counter_decl = parse.simple_assignment(counter, counter_rhs);
        parse.set_top_decl(vec![sig, counter_decl]);
    });

    let (_, x_sym) = find_core_symbol(&c, "x").expect("x lowered to core");
    assert_eq!(x_sym.state_type, StateType::Stateful);
    let bind = x_sym.ast.expect("x has a bind");
    let CoreKind::Bind { initializer, .. } = c.core.kind(bind) else {
        panic!("expected bind for x");
    };
    assert!(initializer.is_some(), "initializer survives to core");
    // Int deep-copies by identity: no copy routine is synthesized.
    assert!(
        !c.core_symbols
            .iter()
            .any(|(_, s)| s.name.as_str().starts_with("deepCopy")),
    );
    let ty = x_sym.ty.expect("x typed");
    assert_eq!(c.types.display(ty, &c.symbols), "Int");
}

// ----------------------------------------------------------------------
// Scenario: addPair (a, b) = a + b at Int
// ----------------------------------------------------------------------

#[test]
fn test_add_pair_specializes_at_int() {
    let c = compile_module(|parse, interner| {
        let add_pair = interner.intern("addPair");
        let a = interner.intern("a");
        let b = interner.intern("b");
        let y = interner.intern("y");
        let plus = interner.intern("+");

        let a_pat = parse.var(a.clone());
        let b_pat = parse.var(b.clone());
        let tuple_pat = parse.tuple(vec![a_pat, b_pat]);
        let a_use = parse.var(a);
        let b_use = parse.var(b);
        let sum = parse.bin_op(plus, a_use, b_use);
        let rhs = parse.rhs(sum);
        let decl = parse.apats_assignment(add_pair.clone(), vec![tuple_pat], rhs);

        let one = parse.int(1);
        let two = parse.int(2);
        let arg = parse.tuple(vec![one, two]);
        let callee = parse.var(add_pair);
        let call = parse.app(callee, arg);
        let y_rhs = parse.rhs(call);
        let y_decl = parse.simple_assignment(y, y_rhs);
        parse.set_top_decl(vec![decl, y_decl]);
    });

    let (_, specialized) =
        find_core_symbol(&c, "addPair<Int>").expect("specialized clone exists");
    let bind = specialized.ast.expect("specialized bind");
    let CoreKind::Bind { expr, .. } = c.core.kind(bind) else {
        panic!("expected bind");
    };
    // One lambda whose body destructures the tuple.
    let CoreKind::Lam { body, .. } = c.core.kind(*expr) else {
        panic!("expected a single lambda");
    };
    let CoreKind::Case { alts, .. } = c.core.kind(*body) else {
        panic!("expected tuple-destructuring case, got {:?}", c.core.kind(*body));
    };
    assert_eq!(alts.len(), 1);

    // The polymorphic original is not lowered.
    assert!(
        !top_chain_symbols(&c).contains(&"addPair".to_string()),
        "vestigial polymorphic binding must be dropped"
    );
}

// ----------------------------------------------------------------------
// Scenario: data W a = W a; x :: W Int; x = W 3
// ----------------------------------------------------------------------

#[test]
fn test_wrapper_type_disappears() {
    let c = compile_module(|parse, interner| {
        let w = interner.intern("W");
        let a = interner.intern("a");
        let x = interner.intern("x");
        let int_name = interner.intern("Int");

        let simple_type = parse.simple_type(w.clone(), vec![a.clone()]);
        let field = parse.alloc(
            ParseAstKind::TypeVar { name: a },
            SourceSpan::NULL,
        );
        let con = parse.constructor(w.clone(), vec![field]);
        let data_decl = parse.data_declaration(simple_type, vec![con]);

        let w_ty = parse.type_con(w.clone());
        let int_ty = parse.type_con(int_name);
        let sig_ty = parse.alloc(
            ParseAstKind::TypeApp {
                ty: w_ty,
                arg: int_ty,
            },
            SourceSpan::NULL,
        );
        let sig = parse.type_signature(x.clone(), sig_ty);

        let w_use = parse.conid(w);
        let three = parse.int(3);
        let wrapped = parse.app(w_use, three);
        let rhs = parse.rhs(wrapped);
        let decl = parse.simple_assignment(x, rhs);
        parse.set_top_decl(vec![data_decl, sig, decl]);
    });

    let (_, x_sym) = find_core_symbol(&c, "x").expect("x lowered");
    let ty = x_sym.ty.expect("x typed");
    assert_eq!(c.types.display(ty, &c.symbols), "Int");
    assert!(
        !top_chain_symbols(&c).contains(&"W".to_string()),
        "the wrapper data declaration must disappear"
    );
}

// ----------------------------------------------------------------------
// Scenario: pipe x f = f x; r = pipe 0 (add 1)
// ----------------------------------------------------------------------

#[test]
fn test_user_pipe_inlines_to_direct_call() {
    let c = compile_module(|parse, interner| {
        let pipe = interner.intern("pipe");
        let x = interner.intern("x");
        let f = interner.intern("f");
        let r = interner.intern("r");
        let add = interner.intern("add");

        let x_pat = parse.var(x.clone());
        let f_pat = parse.var(f.clone());
        let f_use = parse.var(f);
        let x_use = parse.var(x);
        let body = parse.app(f_use, x_use);
        let rhs = parse.rhs(body);
        let pipe_decl = parse.apats_assignment(pipe.clone(), vec![x_pat, f_pat], rhs);

        let zero = parse.int(0);
        let add_use = parse.var(add);
        let one = parse.int(1);
        let add_one = parse.app(add_use, one);
        let pipe_use = parse.var(pipe);
        let inner = parse.app(pipe_use, zero);
        let call = parse.app(inner, add_one);
        let r_rhs = parse.rhs(call);
        let r_decl = parse.simple_assignment(r, r_rhs);
        parse.set_top_decl(vec![pipe_decl, r_decl]);
    });

    // No env type is synthesized: pipe was inlined away.
    assert!(
        find_core_symbol(&c, "Env0").is_none() && find_core_symbol(&c, "Env1").is_none(),
        "a direct call needs no env data type"
    );
    let (_, r_sym) = find_core_symbol(&c, "r").expect("r lowered");
    let ty = r_sym.ty.expect("r typed");
    assert_eq!(c.types.display(ty, &c.symbols), "Int");
}

// ----------------------------------------------------------------------
// Scenario: maybeJustMaybe = Just add
// ----------------------------------------------------------------------

#[test]
fn test_partial_application_in_data_synthesizes_env() {
    let c = compile_module(|parse, interner| {
        let name = interner.intern("maybeJustMaybe");
        let just = interner.intern("Just");
        let add = interner.intern("add");

        let just_use = parse.conid(just);
        let add_use = parse.var(add);
        let value = parse.app(just_use, add_use);
        let rhs = parse.rhs(value);
        let decl = parse.simple_assignment(name, rhs);
        parse.set_top_decl(vec![decl]);
    });

    // The bare function value became an env value in the data type.
    let (_, env_sym) = find_core_symbol(&c, "Env0").expect("env type synthesized");
    assert!(env_sym.ast.is_some());
    let (_, binding) = find_core_symbol(&c, "maybeJustMaybe").expect("binding lowered");
    let bind = binding.ast.expect("bind node");
    let CoreKind::Bind { expr, .. } = c.core.kind(bind) else {
        panic!("expected bind");
    };
    let CoreKind::App { function, .. } = c.core.kind(*expr) else {
        panic!("expected Just applied to an env value");
    };
    let CoreKind::Var { symbol } = c.core.kind(*function) else {
        panic!("expected constructor head");
    };
    assert_eq!(c.core_symbols.name(*symbol).as_str(), "Just");
}

// ----------------------------------------------------------------------
// Fixed points and errors
// ----------------------------------------------------------------------

#[test]
fn test_pre_simplify_is_a_fixed_point() {
    let mut c = compile_module_with(
        |parse, interner| {
            let x = interner.intern("x");
            let true_con = interner.intern("True");
            let rhs_expr = parse.conid(true_con);
            let rhs = parse.rhs(rhs_expr);
            let decl = parse.simple_assignment(x, rhs);
            parse.set_top_decl(vec![decl]);
        },
        CompileOptions {
            stop_after: Some(Phase::CorePreSimplify),
            ..Default::default()
        },
    )
    .expect("pipeline prefix succeeds");

    let root = c.core.root.expect("core root");
    let before = c.core.pretty_print(root, &c.core_symbols, &c.types);
    necroc::core::simplify::pre_simplify(
        &mut c.core,
        &mut c.core_symbols,
        &c.ast,
        &mut c.types,
        &mut c.symbols,
        &c.scopes,
        &c.classes,
        &c.base,
        &mut c.interner,
    )
    .expect("second pass succeeds");
    let root = c.core.root.expect("core root");
    let after = c.core.pretty_print(root, &c.core_symbols, &c.types);
    assert_eq!(before, after);
}

#[test]
fn test_every_ast_node_typed_after_inference() {
    let c = compile_module_with(
        |parse, interner| {
            let x = interner.intern("x");
            let true_con = interner.intern("True");
            let rhs_expr = parse.conid(true_con);
            let rhs = parse.rhs(rhs_expr);
            let decl = parse.simple_assignment(x, rhs);
            parse.set_top_decl(vec![decl]);
        },
        CompileOptions {
            stop_after: Some(Phase::Infer),
            ..Default::default()
        },
    )
    .expect("pipeline prefix succeeds");

    let root = c.ast.root.expect("ast root");
    let mut work = vec![root];
    while let Some(id) = work.pop() {
        assert!(
            c.ast.ty(id).is_some(),
            "node {id:?} left untyped: {:?}",
            c.ast.kind(id)
        );
        work.extend(c.ast.children(id));
    }
}

#[test]
fn test_mismatched_signature_reports_both_types() {
    let err = compile_module_with(
        |parse, interner| {
            let x = interner.intern("x");
            let int_name = interner.intern("Int");
            let true_con = interner.intern("True");
            let sig_ty = parse.type_con(int_name);
            let sig = parse.type_signature(x.clone(), sig_ty);
            let rhs_expr = parse.conid(true_con);
            let rhs = parse.rhs(rhs_expr);
            let decl = parse.simple_assignment(x, rhs);
            parse.set_top_decl(vec![sig, decl]);
        },
        CompileOptions::default(),
    )
    .expect_err("Bool against Int must fail");
    let rendered = err.to_string();
    assert!(rendered.contains("Int") && rendered.contains("Bool"));
}

#[test]
fn test_initializer_on_non_recursive_binding_is_an_error() {
    let err = compile_module_with(
        |parse, interner| {
            let x = interner.intern("x");
            let zero = parse.int(0);
            let one = parse.int(1);
            let rhs = parse.rhs(one);
            let decl = parse.initialized_assignment(x, zero, rhs);
            parse.set_top_decl(vec![decl]);
        },
        CompileOptions::default(),
    )
    .expect_err("non-recursive initialized value must fail");
    assert!(matches!(
        err.kind,
        necroc::CompileErrorKind::NonRecursiveInitializedValue { .. }
    ));
}

#[test]
fn test_non_exhaustive_case_is_an_error() {
    let err = compile_module_with(
        |parse, interner| {
            // f b = case b of True -> b
            let f = interner.intern("f");
            let b = interner.intern("b");
            let true_con = interner.intern("True");
            let b_pat = parse.var(b.clone());
            let scrutinee = parse.var(b.clone());
            let pat = parse.conid(true_con);
            let body = parse.var(b);
            let alt = parse.alloc(
                ParseAstKind::CaseAlternative { pat, body },
                SourceSpan::NULL,
            );
            let case = parse.alloc(
                ParseAstKind::Case {
                    expression: scrutinee,
                    alternatives: vec![alt],
                },
                SourceSpan::NULL,
            );
            let rhs = parse.rhs(case);
            let decl = parse.apats_assignment(f, vec![b_pat], rhs);
            parse.set_top_decl(vec![decl]);
        },
        CompileOptions::default(),
    )
    .expect_err("single-alternative Bool case must fail");
    assert!(matches!(
        err.kind,
        necroc::CompileErrorKind::NonExhaustivePatterns { .. }
    ));
}
