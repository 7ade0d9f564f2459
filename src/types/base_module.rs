//! The base module: the pre-compiled prelude every user module compiles
//! against.
//!
//! Provides the primitive types (`Int`, `Float`, `Bool`, `Audio`, `Array`,
//! tuples up to arity 10, ...), the kind constructors (`Type`, `Nat`,
//! `Sym`, `Uniqueness` with `Shared`/`Unique`), the standard classes with
//! their method signatures and primitive instances, the binary operators,
//! the sequence-desugaring primitives, and the runtime FFI symbols.
//!
//! Compilation populates the shared symbol table, scope tree, type arena,
//! and class table, and returns a [`BaseModule`] of well-known ids. The
//! interning tables are logically immutable afterwards; user-module phases
//! only read them and add entries for fresh symbols.

use crate::base::{Interner, SourceSpan, Symbol};
use crate::syntax::ast::{AstArena, AstId, AstKind, ConKind};
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::{StateType, SymbolId, SymbolTable};
use crate::types::class::{ClassId, ClassInstance, ClassTable, TypeClass};
use crate::types::{TypeArena, TypeId};

pub const BASE_MODULE_NAME: &str = "Necro.Base";

/// Well-known ids of everything the base module declares.
#[derive(Debug)]
pub struct BaseModule {
    pub module_name: Symbol,

    // ------------------------------------------------------------------
    // Kinds
    // ------------------------------------------------------------------
    pub higher_kind: SymbolId,
    pub kind_kind: SymbolId,
    pub star_kind: SymbolId,
    pub nat_kind: SymbolId,
    pub sym_kind: SymbolId,
    pub attribute_kind: SymbolId,
    pub ownership_kind: SymbolId,
    pub ownership_shared: SymbolId,
    pub ownership_unique: SymbolId,

    pub star_kind_ty: TypeId,
    pub nat_kind_ty: TypeId,
    pub sym_kind_ty: TypeId,
    pub ownership_kind_ty: TypeId,
    pub shared_ty: TypeId,
    pub unique_ty: TypeId,

    // ------------------------------------------------------------------
    // Primitive types
    // ------------------------------------------------------------------
    pub int_type: SymbolId,
    pub uint_type: SymbolId,
    pub float_type: SymbolId,
    pub rational_type: SymbolId,
    pub char_type: SymbolId,
    pub bool_type: SymbolId,
    pub unit_type: SymbolId,
    pub audio_type: SymbolId,
    pub pattern_type: SymbolId,
    pub array_type: SymbolId,
    pub maybe_type: SymbolId,
    pub event_type: SymbolId,
    pub world_type: SymbolId,
    pub ptr_type: SymbolId,
    pub index_type: SymbolId,
    pub seq_type: SymbolId,
    pub seq_value_type: SymbolId,
    /// Tuple type constructors, arity 2..=10.
    pub tuple_types: [SymbolId; 9],

    // ------------------------------------------------------------------
    // Data constructors
    // ------------------------------------------------------------------
    pub true_con: SymbolId,
    pub false_con: SymbolId,
    pub unit_con: SymbolId,
    pub nothing_con: SymbolId,
    pub just_con: SymbolId,
    pub seq_con: SymbolId,
    /// Tuple data constructors, arity 2..=10.
    pub tuple_cons: [SymbolId; 9],

    // ------------------------------------------------------------------
    // Classes and methods
    // ------------------------------------------------------------------
    pub num_class: SymbolId,
    pub fractional_class: SymbolId,
    pub eq_class: SymbolId,
    pub ord_class: SymbolId,
    pub functor_class: SymbolId,
    pub applicative_class: SymbolId,
    pub monad_class: SymbolId,
    pub semigroup_class: SymbolId,
    pub monoid_class: SymbolId,
    pub default_class: SymbolId,

    pub from_int: SymbolId,
    pub from_rational: SymbolId,
    pub add: SymbolId,
    pub sub: SymbolId,
    pub mul: SymbolId,
    pub div: SymbolId,
    pub eq: SymbolId,
    pub neq: SymbolId,
    pub lt: SymbolId,
    pub gt: SymbolId,
    pub lte: SymbolId,
    pub gte: SymbolId,
    pub map_method: SymbolId,
    pub pure_method: SymbolId,
    pub ap_method: SymbolId,
    pub bind_method: SymbolId,
    pub then_method: SymbolId,
    pub append_method: SymbolId,
    pub mempty_method: SymbolId,
    pub default_method: SymbolId,

    // ------------------------------------------------------------------
    // Base functions
    // ------------------------------------------------------------------
    pub id_fn: SymbolId,
    pub compose_fn: SymbolId,
    pub and_fn: SymbolId,
    pub or_fn: SymbolId,
    pub pipe_forward: SymbolId,
    pub pipe_back: SymbolId,

    // ------------------------------------------------------------------
    // Runtime FFI
    // ------------------------------------------------------------------
    pub mouse_x_fn: SymbolId,
    pub mouse_y_fn: SymbolId,
    pub unsafe_malloc: SymbolId,
    pub unsafe_peek: SymbolId,
    pub unsafe_poke: SymbolId,
    pub print_int: SymbolId,
    pub world_value: SymbolId,
    pub read_array: SymbolId,
    pub write_array: SymbolId,
    pub unsafe_empty_array: SymbolId,

    // ------------------------------------------------------------------
    // Sequence primitives
    // ------------------------------------------------------------------
    pub seq_tick: SymbolId,
    pub tuple_tick: SymbolId,
    pub interleave_tick: SymbolId,
    pub run_seq: SymbolId,

    pub prim_undefined: SymbolId,

    /// Base data declarations, lowered into Core ahead of user code.
    pub data_declarations: Vec<AstId>,
}

struct BaseBuilder<'a> {
    interner: &'a mut Interner,
    symbols: &'a mut SymbolTable,
    scopes: &'a mut ScopeTable,
    types: &'a mut TypeArena,
    classes: &'a mut ClassTable,
    ast: &'a mut AstArena,
    module_name: Symbol,
    /// Set once the kind symbols exist.
    star_ty: Option<TypeId>,
    data_declarations_buf: Vec<AstId>,
}

impl BaseModule {
    /// Compile the base module into the shared tables.
    pub fn compile(
        interner: &mut Interner,
        symbols: &mut SymbolTable,
        scopes: &mut ScopeTable,
        types: &mut TypeArena,
        classes: &mut ClassTable,
        ast: &mut AstArena,
    ) -> BaseModule {
        let module_name = interner.intern(BASE_MODULE_NAME);
        let mut b = BaseBuilder {
            interner,
            symbols,
            scopes,
            types,
            classes,
            ast,
            module_name,
            star_ty: None,
            data_declarations_buf: Vec::new(),
        };
        b.build()
    }

    pub fn tuple_type(&self, arity: usize) -> Option<SymbolId> {
        (2..=10).contains(&arity).then(|| self.tuple_types[arity - 2])
    }

    pub fn tuple_con(&self, arity: usize) -> Option<SymbolId> {
        (2..=10).contains(&arity).then(|| self.tuple_cons[arity - 2])
    }

    /// Arity of a tuple constructor symbol, when it is one.
    pub fn tuple_con_arity(&self, symbol: SymbolId) -> Option<usize> {
        self.tuple_cons.iter().position(|&c| c == symbol).map(|i| i + 2)
    }
}

impl<'a> BaseBuilder<'a> {
    fn symbol(&mut self, name: &str) -> SymbolId {
        let sym = self.interner.intern(name);
        self.symbols
            .fresh(sym, self.module_name.clone(), SourceSpan::NULL)
    }

    fn insert_type_scope(&mut self, id: SymbolId) {
        let name = self.symbols.source_name(id).clone();
        let top = self.scopes.top_type;
        self.scopes.insert(top, name, id);
    }

    fn insert_term_scope(&mut self, id: SymbolId) {
        let name = self.symbols.source_name(id).clone();
        let top = self.scopes.top_term;
        self.scopes.insert(top, name, id);
    }

    /// A kind constructor (`Type`, `Nat`, ...): a nullary `Con` whose own
    /// kind is `kind_of`.
    fn kind_symbol(&mut self, name: &str, kind_of: Option<TypeId>) -> (SymbolId, TypeId) {
        let id = self.symbol(name);
        let ty = self.types.mk_con(id, Vec::new());
        self.types.get_mut(ty).kind_of = kind_of;
        self.symbols.get_mut(id).ty = Some(ty);
        self.symbols.get_mut(id).is_primitive = true;
        self.insert_type_scope(id);
        (id, ty)
    }

    /// A primitive type constructor with the given kind.
    fn prim_type(&mut self, name: &str, kind: TypeId, is_enum: bool) -> SymbolId {
        let id = self.symbol(name);
        let ty = self.types.mk_con(id, Vec::new());
        self.types.get_mut(ty).kind_of = Some(kind);
        let sym = self.symbols.get_mut(id);
        sym.ty = Some(ty);
        sym.is_primitive = true;
        sym.is_enum = is_enum;
        self.insert_type_scope(id);
        id
    }

    /// A primitive term binding with a pre-supplied type.
    fn prim_value(&mut self, name: &str, ty: TypeId, arity: usize, state: StateType) -> SymbolId {
        let id = self.symbol(name);
        let sym = self.symbols.get_mut(id);
        sym.ty = Some(ty);
        sym.is_primitive = true;
        sym.arity = Some(arity);
        sym.state_type = state;
        self.insert_term_scope(id);
        id
    }

    /// A rigid signature variable for building `forall` types.
    fn sig_var(&mut self, name: &str, kind: TypeId) -> (SymbolId, TypeId) {
        let id = self.symbol(name);
        let ty = self.types.mk_rigid_var(id, None);
        self.types.get_mut(ty).kind_of = Some(kind);
        self.symbols.get_mut(id).ty = Some(ty);
        (id, ty)
    }

    fn build(&mut self) -> BaseModule {
        // --------------------------------------------------------------
        // Kinds
        // --------------------------------------------------------------
        let (higher_kind, higher_ty) = self.kind_symbol("TheoreticalHigherKindedKind", None);
        let (kind_kind, kind_kind_ty) = self.kind_symbol("Kind", Some(higher_ty));
        let (star_kind, star_kind_ty) = self.kind_symbol("Type", Some(kind_kind_ty));
        let (attribute_kind, _) = self.kind_symbol("Attribute", Some(kind_kind_ty));
        let (nat_kind, nat_kind_ty) = self.kind_symbol("Nat", Some(kind_kind_ty));
        let (sym_kind, sym_kind_ty) = self.kind_symbol("Sym", Some(kind_kind_ty));
        let (ownership_kind, ownership_kind_ty) = self.kind_symbol("Uniqueness", Some(kind_kind_ty));
        let (ownership_shared, shared_ty) = self.kind_symbol("Shared", Some(ownership_kind_ty));
        let (ownership_unique, unique_ty) = self.kind_symbol("Unique", Some(ownership_kind_ty));
        self.star_ty = Some(star_kind_ty);

        let star = star_kind_ty;
        let star_to_star = self.types.mk_fun(star, star);
        let nat_to_star = self.types.mk_fun(nat_kind_ty, star);
        let nat_star_star = {
            let inner = self.types.mk_fun(star, star);
            self.types.mk_fun(nat_kind_ty, inner)
        };

        // --------------------------------------------------------------
        // Primitive types
        // --------------------------------------------------------------
        let int_type = self.prim_type("Int", star, true);
        let uint_type = self.prim_type("UInt", star, true);
        let float_type = self.prim_type("Float", star, true);
        let rational_type = self.prim_type("Rational", star, true);
        let char_type = self.prim_type("Char", star, true);
        let bool_type = self.prim_type("Bool", star, true);
        let unit_type = self.prim_type("()", star, true);
        let index_type = self.prim_type("Index", star, true);
        let audio_type = self.prim_type("Audio", star, false);
        let world_type = self.prim_type("World", star, false);
        let event_type = self.prim_type("Event", star_to_star, false);
        let pattern_type = self.prim_type("Pattern", star_to_star, false);
        let ptr_type = self.prim_type("Ptr", star_to_star, false);
        let maybe_type = self.prim_type("Maybe", star_to_star, false);
        let seq_type = self.prim_type("Seq", star_to_star, false);
        let seq_value_type = self.prim_type("SeqValue", star_to_star, false);
        let array_type = self.prim_type("Array", nat_star_star, false);
        let _ = nat_to_star;

        let tuple_names = [
            "(,)", "(,,)", "(,,,)", "(,,,,)", "(,,,,,)", "(,,,,,,)", "(,,,,,,,)", "(,,,,,,,,)",
            "(,,,,,,,,,)",
        ];
        let mut tuple_types = [int_type; 9];
        for (i, name) in tuple_names.iter().enumerate() {
            let arity = i + 2;
            let mut kind = star;
            for _ in 0..arity {
                kind = self.types.mk_fun(star, kind);
            }
            tuple_types[i] = self.prim_type(name, kind, false);
        }

        // --------------------------------------------------------------
        // Data constructors (with base data declarations for Core)
        // --------------------------------------------------------------
        let bool_ty = self.types.mk_con(bool_type, Vec::new());
        self.types.get_mut(bool_ty).kind_of = Some(star);
        let false_con = self.data_con("False", bool_type, bool_ty, &[], 0, true);
        let true_con = self.data_con("True", bool_type, bool_ty, &[], 1, true);

        let unit_ty = self.types.mk_con(unit_type, Vec::new());
        self.types.get_mut(unit_ty).kind_of = Some(star);
        let unit_con = self.data_con("()", unit_type, unit_ty, &[], 0, true);

        // Maybe a
        let (maybe_var_sym, maybe_var_ty) = self.sig_var("a", star);
        let maybe_a = self.types.mk_con(maybe_type, vec![maybe_var_ty]);
        self.types.get_mut(maybe_a).kind_of = Some(star);
        let nothing_inner = maybe_a;
        let nothing_ty = self
            .types
            .mk_for_all(maybe_var_sym, Vec::new(), nothing_inner);
        let just_inner = self.types.mk_fun(maybe_var_ty, maybe_a);
        let just_ty = self.types.mk_for_all(maybe_var_sym, Vec::new(), just_inner);
        let nothing_con = self.data_con_ty("Nothing", nothing_ty, 0, 0);
        let just_con = self.data_con_ty("Just", just_ty, 1, 1);
        self.emit_data_declaration(maybe_type, &[nothing_con, just_con]);

        // Bool and () get their declarations too.
        self.emit_data_declaration(bool_type, &[false_con, true_con]);
        self.emit_data_declaration(unit_type, &[unit_con]);

        // Tuples
        let var_names = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let mut tuple_cons = [true_con; 9];
        for (i, &tuple_type) in tuple_types.iter().enumerate() {
            let arity = i + 2;
            let mut var_syms = Vec::with_capacity(arity);
            let mut var_tys = Vec::with_capacity(arity);
            for name in var_names.iter().take(arity) {
                let (s, t) = self.sig_var(name, star);
                var_syms.push(s);
                var_tys.push(t);
            }
            let result = self.types.mk_con(tuple_type, var_tys.clone());
            self.types.get_mut(result).kind_of = Some(star);
            let mut con_ty = self.types.mk_fun_chain(&var_tys, result);
            for &var in var_syms.iter().rev() {
                con_ty = self.types.mk_for_all(var, Vec::new(), con_ty);
            }
            let name = tuple_names[i];
            let con = self.data_con_ty(name, con_ty, 0, arity);
            tuple_cons[i] = con;
            self.emit_data_declaration(tuple_type, &[con]);
        }

        // Seq: Seq ((Index, SeqValue a) -> a)
        let index_ty = self.types.mk_con(index_type, Vec::new());
        self.types.get_mut(index_ty).kind_of = Some(star);
        let (seq_var_sym, seq_var_ty) = self.sig_var("a", star);
        let seq_value_a = self.types.mk_con(seq_value_type, vec![seq_var_ty]);
        self.types.get_mut(seq_value_a).kind_of = Some(star);
        let seq_acc = self.types.mk_con(tuple_types[0], vec![index_ty, seq_value_a]);
        self.types.get_mut(seq_acc).kind_of = Some(star);
        let seq_step = self.types.mk_fun(seq_acc, seq_var_ty);
        let seq_a = self.types.mk_con(seq_type, vec![seq_var_ty]);
        self.types.get_mut(seq_a).kind_of = Some(star);
        let seq_con_inner = self.types.mk_fun(seq_step, seq_a);
        let seq_con_ty = self.types.mk_for_all(seq_var_sym, Vec::new(), seq_con_inner);
        let seq_con = self.data_con_ty("Seq", seq_con_ty, 0, 1);
        self.emit_data_declaration(seq_type, &[seq_con]);

        // --------------------------------------------------------------
        // Classes
        // --------------------------------------------------------------
        let num_class = self.symbol("Num");
        let fractional_class = self.symbol("Fractional");
        let eq_class = self.symbol("Eq");
        let ord_class = self.symbol("Ord");
        let functor_class = self.symbol("Functor");
        let applicative_class = self.symbol("Applicative");
        let monad_class = self.symbol("Monad");
        let semigroup_class = self.symbol("Semigroup");
        let monoid_class = self.symbol("Monoid");
        let default_class = self.symbol("Default");
        for class in [
            num_class,
            fractional_class,
            eq_class,
            ord_class,
            functor_class,
            applicative_class,
            monad_class,
            semigroup_class,
            monoid_class,
            default_class,
        ] {
            self.insert_type_scope(class);
        }

        // Method types over the class variable.
        let int_ty = self.types.mk_con(int_type, Vec::new());
        self.types.get_mut(int_ty).kind_of = Some(star);
        let rational_ty = self.types.mk_con(rational_type, Vec::new());
        self.types.get_mut(rational_ty).kind_of = Some(star);

        // Num: add, sub, mul, fromInt
        let add = self.method("add", num_class, |b, a| b.bin_op_ty(a));
        let sub = self.method("sub", num_class, |b, a| b.bin_op_ty(a));
        let mul = self.method("mul", num_class, |b, a| b.bin_op_ty(a));
        let from_int = self.method("fromInt", num_class, |b, a| b.types.mk_fun(int_ty, a));
        let num_id = self.class_record(num_class, &[add, sub, mul, from_int], &[], star);

        // Fractional: div, fromRational; super Num
        let div = self.method("div", fractional_class, |b, a| b.bin_op_ty(a));
        let from_rational = self.method("fromRational", fractional_class, |b, a| {
            b.types.mk_fun(rational_ty, a)
        });
        let fractional_id =
            self.class_record(fractional_class, &[div, from_rational], &[num_class], star);

        // Eq: eq, neq
        let eq = self.method("eq", eq_class, |b, a| b.cmp_op_ty(a, bool_ty));
        let neq = self.method("neq", eq_class, |b, a| b.cmp_op_ty(a, bool_ty));
        let eq_id = self.class_record(eq_class, &[eq, neq], &[], star);

        // Ord: lt, gt, lte, gte; super Eq
        let lt = self.method("lt", ord_class, |b, a| b.cmp_op_ty(a, bool_ty));
        let gt = self.method("gt", ord_class, |b, a| b.cmp_op_ty(a, bool_ty));
        let lte = self.method("lte", ord_class, |b, a| b.cmp_op_ty(a, bool_ty));
        let gte = self.method("gte", ord_class, |b, a| b.cmp_op_ty(a, bool_ty));
        let ord_id = self.class_record(ord_class, &[lt, gt, lte, gte], &[eq_class], star);

        // Functor / Applicative / Monad over f :: Type -> Type
        let map_method = self.method_hk("map", functor_class, star_to_star, |b, f| {
            // (a -> b) -> f a -> f b
            let (_, a) = b.sig_var("a", star);
            let (_, c) = b.sig_var("b", star);
            let fa = b.types.mk_app(f, a);
            let fb = b.types.mk_app(f, c);
            let a_to_b = b.types.mk_fun(a, c);
            let inner = b.types.mk_fun(fa, fb);
            b.types.mk_fun(a_to_b, inner)
        });
        let functor_id = self.class_record_hk(functor_class, &[map_method], &[], star_to_star);

        let pure_method = self.method_hk("pure", applicative_class, star_to_star, |b, f| {
            let (_, a) = b.sig_var("a", star);
            let fa = b.types.mk_app(f, a);
            b.types.mk_fun(a, fa)
        });
        let ap_method = self.method_hk("ap", applicative_class, star_to_star, |b, f| {
            let (_, a) = b.sig_var("a", star);
            let (_, c) = b.sig_var("b", star);
            let a_to_b = b.types.mk_fun(a, c);
            let f_ab = b.types.mk_app(f, a_to_b);
            let fa = b.types.mk_app(f, a);
            let fb = b.types.mk_app(f, c);
            let inner = b.types.mk_fun(fa, fb);
            b.types.mk_fun(f_ab, inner)
        });
        let applicative_id = self.class_record_hk(
            applicative_class,
            &[pure_method, ap_method],
            &[functor_class],
            star_to_star,
        );

        let bind_method = self.method_hk("bind", monad_class, star_to_star, |b, m| {
            let (_, a) = b.sig_var("a", star);
            let (_, c) = b.sig_var("b", star);
            let ma = b.types.mk_app(m, a);
            let mb = b.types.mk_app(m, c);
            let k = b.types.mk_fun(a, mb);
            let inner = b.types.mk_fun(k, mb);
            let _ = c;
            b.types.mk_fun(ma, inner)
        });
        let then_method = self.method_hk("then", monad_class, star_to_star, |b, m| {
            let (_, a) = b.sig_var("a", star);
            let (_, c) = b.sig_var("b", star);
            let ma = b.types.mk_app(m, a);
            let mb = b.types.mk_app(m, c);
            let inner = b.types.mk_fun(mb, mb);
            b.types.mk_fun(ma, inner)
        });
        let monad_id = self.class_record_hk(
            monad_class,
            &[bind_method, then_method],
            &[applicative_class],
            star_to_star,
        );

        // Semigroup / Monoid / Default
        let append_method = self.method("append", semigroup_class, |b, a| b.bin_op_ty(a));
        let semigroup_id = self.class_record(semigroup_class, &[append_method], &[], star);
        let mempty_method = self.method("mempty", monoid_class, |_, a| a);
        let monoid_id =
            self.class_record(monoid_class, &[mempty_method], &[semigroup_class], star);
        let default_method = self.method("default", default_class, |_, a| a);
        let default_id = self.class_record(default_class, &[default_method], &[], star);

        let _ = (
            num_id,
            fractional_id,
            eq_id,
            ord_id,
            functor_id,
            applicative_id,
            monad_id,
            semigroup_id,
            monoid_id,
            default_id,
        );

        // --------------------------------------------------------------
        // Operators resolve to methods / base functions by name
        // --------------------------------------------------------------
        let float_ty = self.types.mk_con(float_type, Vec::new());
        self.types.get_mut(float_ty).kind_of = Some(star);

        self.alias_operator("+", add);
        self.alias_operator("-", sub);
        self.alias_operator("*", mul);
        self.alias_operator("/", div);
        self.alias_operator("==", eq);
        self.alias_operator("/=", neq);
        self.alias_operator("<", lt);
        self.alias_operator(">", gt);
        self.alias_operator("<=", lte);
        self.alias_operator(">=", gte);
        self.alias_operator(">>=", bind_method);
        self.alias_operator(">>", then_method);
        self.alias_operator("<>", append_method);

        // Bool operators are plain primitives.
        let bool_bin = {
            let inner = self.types.mk_fun(bool_ty, bool_ty);
            self.types.mk_fun(bool_ty, inner)
        };
        let and_fn = self.prim_value("&&", bool_bin, 2, StateType::Pointwise);
        let or_fn = self.prim_value("||", bool_bin, 2, StateType::Pointwise);

        // id, composition, pipes.
        let id_fn = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let inner = self.types.mk_fun(a_ty, a_ty);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), inner);
            self.prim_value("id", ty, 1, StateType::Pointwise)
        };
        let compose_fn = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let (b_sym, b_ty) = self.sig_var("b", star);
            let (c_sym, c_ty) = self.sig_var("c", star);
            let b_to_c = self.types.mk_fun(b_ty, c_ty);
            let a_to_b = self.types.mk_fun(a_ty, b_ty);
            let a_to_c = self.types.mk_fun(a_ty, c_ty);
            let inner = self.types.mk_fun(a_to_b, a_to_c);
            let ty = self.types.mk_fun(b_to_c, inner);
            let ty = self.types.mk_for_all(c_sym, Vec::new(), ty);
            let ty = self.types.mk_for_all(b_sym, Vec::new(), ty);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            self.prim_value(".", ty, 3, StateType::Pointwise)
        };
        let pipe_forward = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let (b_sym, b_ty) = self.sig_var("b", star);
            let a_to_b = self.types.mk_fun(a_ty, b_ty);
            let inner = self.types.mk_fun(a_to_b, b_ty);
            let ty = self.types.mk_fun(a_ty, inner);
            let ty = self.types.mk_for_all(b_sym, Vec::new(), ty);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            self.prim_value("|>", ty, 2, StateType::Pointwise)
        };
        let pipe_back = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let (b_sym, b_ty) = self.sig_var("b", star);
            let a_to_b = self.types.mk_fun(a_ty, b_ty);
            let inner = self.types.mk_fun(a_ty, b_ty);
            let ty = self.types.mk_fun(a_to_b, inner);
            let ty = self.types.mk_for_all(b_sym, Vec::new(), ty);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            self.prim_value("<|", ty, 2, StateType::Pointwise)
        };

        // --------------------------------------------------------------
        // Primitive instances
        // --------------------------------------------------------------
        self.prim_instance(num_class, int_type, &[(add, 2), (sub, 2), (mul, 2), (from_int, 1)], int_ty, bool_ty);
        self.prim_instance(num_class, float_type, &[(add, 2), (sub, 2), (mul, 2), (from_int, 1)], float_ty, bool_ty);
        self.prim_instance(num_class, audio_type, &[(add, 2), (sub, 2), (mul, 2), (from_int, 1)], float_ty, bool_ty);
        self.prim_instance(
            fractional_class,
            float_type,
            &[(div, 2), (from_rational, 1)],
            float_ty,
            bool_ty,
        );
        self.prim_instance(
            fractional_class,
            audio_type,
            &[(div, 2), (from_rational, 1)],
            float_ty,
            bool_ty,
        );
        for prim in [int_type, uint_type, float_type, char_type, bool_type, unit_type] {
            self.prim_instance(eq_class, prim, &[(eq, 2), (neq, 2)], int_ty, bool_ty);
        }
        for prim in [int_type, uint_type, float_type, char_type, unit_type] {
            self.prim_instance(
                ord_class,
                prim,
                &[(lt, 2), (gt, 2), (lte, 2), (gte, 2)],
                int_ty,
                bool_ty,
            );
        }
        for prim in [int_type, uint_type, float_type] {
            self.prim_instance(default_class, prim, &[(default_method, 0)], int_ty, bool_ty);
        }
        self.prim_instance(
            functor_class,
            maybe_type,
            &[(map_method, 2)],
            int_ty,
            bool_ty,
        );
        self.prim_instance(
            applicative_class,
            maybe_type,
            &[(pure_method, 1), (ap_method, 2)],
            int_ty,
            bool_ty,
        );
        self.prim_instance(
            monad_class,
            maybe_type,
            &[(bind_method, 2), (then_method, 2)],
            int_ty,
            bool_ty,
        );

        // --------------------------------------------------------------
        // Runtime FFI
        // --------------------------------------------------------------
        let world_ty = self.types.mk_con(world_type, Vec::new());
        self.types.get_mut(world_ty).kind_of = Some(star);
        let world_to_int = self.types.mk_fun(world_ty, int_ty);
        let mouse_x_fn = self.prim_value("getMouseX", world_to_int, 1, StateType::Pointwise);
        let mouse_y_fn = self.prim_value("getMouseY", world_to_int, 1, StateType::Pointwise);
        let print_int = {
            let inner = self.types.mk_fun(world_ty, world_ty);
            let ty = self.types.mk_fun(int_ty, inner);
            self.prim_value("printInt", ty, 2, StateType::Pointwise)
        };
        let world_value = self.prim_value("world", world_ty, 0, StateType::Pointwise);

        let unsafe_malloc = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let ptr_a = self.types.mk_con(ptr_type, vec![a_ty]);
            self.types.get_mut(ptr_a).kind_of = Some(star);
            let inner = self.types.mk_fun(int_ty, ptr_a);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), inner);
            self.prim_value("unsafeMalloc", ty, 1, StateType::Pointwise)
        };
        let unsafe_peek = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let ptr_a = self.types.mk_con(ptr_type, vec![a_ty]);
            self.types.get_mut(ptr_a).kind_of = Some(star);
            let inner = self.types.mk_fun(ptr_a, a_ty);
            let ty = self.types.mk_fun(int_ty, inner);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            self.prim_value("unsafePeek", ty, 2, StateType::Pointwise)
        };
        let unsafe_poke = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let ptr_a = self.types.mk_con(ptr_type, vec![a_ty]);
            self.types.get_mut(ptr_a).kind_of = Some(star);
            let ptr_to_ptr = self.types.mk_fun(ptr_a, ptr_a);
            let val_in = self.types.mk_fun(a_ty, ptr_to_ptr);
            let ty = self.types.mk_fun(int_ty, val_in);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            self.prim_value("unsafePoke", ty, 3, StateType::Pointwise)
        };

        // Array primitives, used directly and by deep-copy synthesis.
        let read_array = {
            let (n_sym, n_ty) = self.sig_var("n", nat_kind_ty);
            let (a_sym, a_ty) = self.sig_var("a", star);
            let array_a = self.types.mk_con(array_type, vec![n_ty, a_ty]);
            self.types.get_mut(array_a).kind_of = Some(star);
            let index_ty2 = self.types.mk_con(index_type, Vec::new());
            self.types.get_mut(index_ty2).kind_of = Some(star);
            let inner = self.types.mk_fun(array_a, a_ty);
            let ty = self.types.mk_fun(index_ty2, inner);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            let ty = self.types.mk_for_all(n_sym, Vec::new(), ty);
            self.prim_value("readArray", ty, 2, StateType::Pointwise)
        };
        let write_array = {
            let (n_sym, n_ty) = self.sig_var("n", nat_kind_ty);
            let (a_sym, a_ty) = self.sig_var("a", star);
            let array_a = self.types.mk_con(array_type, vec![n_ty, a_ty]);
            self.types.get_mut(array_a).kind_of = Some(star);
            let index_ty2 = self.types.mk_con(index_type, Vec::new());
            self.types.get_mut(index_ty2).kind_of = Some(star);
            let arr_to_arr = self.types.mk_fun(array_a, array_a);
            let val_in = self.types.mk_fun(a_ty, arr_to_arr);
            let ty = self.types.mk_fun(index_ty2, val_in);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), ty);
            let ty = self.types.mk_for_all(n_sym, Vec::new(), ty);
            self.prim_value("writeArray", ty, 3, StateType::Pointwise)
        };
        let unsafe_empty_array = {
            let (n_sym, n_ty) = self.sig_var("n", nat_kind_ty);
            let (a_sym, a_ty) = self.sig_var("a", star);
            let array_a = self.types.mk_con(array_type, vec![n_ty, a_ty]);
            self.types.get_mut(array_a).kind_of = Some(star);
            let unit_ty2 = self.types.mk_con(unit_type, Vec::new());
            self.types.get_mut(unit_ty2).kind_of = Some(star);
            let inner = self.types.mk_fun(unit_ty2, array_a);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), inner);
            let ty = self.types.mk_for_all(n_sym, Vec::new(), ty);
            self.prim_value("unsafeEmptyArray", ty, 1, StateType::Pointwise)
        };

        // --------------------------------------------------------------
        // Sequence primitives
        // --------------------------------------------------------------
        let tick_ty = |b: &mut Self| {
            let (a_sym, a_ty) = b.sig_var("a", star);
            let sv = b.types.mk_con(seq_value_type, vec![a_ty]);
            b.types.get_mut(sv).kind_of = Some(star);
            let index_ty2 = b.types.mk_con(index_type, Vec::new());
            b.types.get_mut(index_ty2).kind_of = Some(star);
            let acc = b.types.mk_con(tuple_types[0], vec![index_ty2, sv]);
            b.types.get_mut(acc).kind_of = Some(star);
            let inner = b.types.mk_fun(acc, acc);
            b.types.mk_for_all(a_sym, Vec::new(), inner)
        };
        let seq_tick_ty = tick_ty(self);
        let seq_tick = self.prim_value("seqTick", seq_tick_ty, 1, StateType::Stateful);
        let tuple_tick_ty = tick_ty(self);
        let tuple_tick = self.prim_value("tupleTick", tuple_tick_ty, 1, StateType::Stateful);
        let interleave_tick_ty = tick_ty(self);
        let interleave_tick =
            self.prim_value("interleaveTick", interleave_tick_ty, 1, StateType::Stateful);
        let run_seq = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let seq_a2 = self.types.mk_con(seq_type, vec![a_ty]);
            self.types.get_mut(seq_a2).kind_of = Some(star);
            let pattern_a = self.types.mk_con(pattern_type, vec![a_ty]);
            self.types.get_mut(pattern_a).kind_of = Some(star);
            let inner = self.types.mk_fun(seq_a2, pattern_a);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), inner);
            self.prim_value("runSeq", ty, 1, StateType::Stateful)
        };

        let prim_undefined = {
            let (a_sym, a_ty) = self.sig_var("a", star);
            let ty = self.types.mk_for_all(a_sym, Vec::new(), a_ty);
            self.prim_value("_primUndefined", ty, 0, StateType::Constant)
        };

        BaseModule {
            module_name: self.module_name.clone(),
            higher_kind,
            kind_kind,
            star_kind,
            nat_kind,
            sym_kind,
            attribute_kind,
            ownership_kind,
            ownership_shared,
            ownership_unique,
            star_kind_ty,
            nat_kind_ty,
            sym_kind_ty,
            ownership_kind_ty,
            shared_ty,
            unique_ty,
            int_type,
            uint_type,
            float_type,
            rational_type,
            char_type,
            bool_type,
            unit_type,
            audio_type,
            pattern_type,
            array_type,
            maybe_type,
            event_type,
            world_type,
            ptr_type,
            index_type,
            seq_type,
            seq_value_type,
            tuple_types,
            true_con,
            false_con,
            unit_con,
            nothing_con,
            just_con,
            seq_con,
            tuple_cons,
            num_class,
            fractional_class,
            eq_class,
            ord_class,
            functor_class,
            applicative_class,
            monad_class,
            semigroup_class,
            monoid_class,
            default_class,
            from_int,
            from_rational,
            add,
            sub,
            mul,
            div,
            eq,
            neq,
            lt,
            gt,
            lte,
            gte,
            map_method,
            pure_method,
            ap_method,
            bind_method,
            then_method,
            append_method,
            mempty_method,
            default_method,
            id_fn,
            compose_fn,
            and_fn,
            or_fn,
            pipe_forward,
            pipe_back,
            mouse_x_fn,
            mouse_y_fn,
            unsafe_malloc,
            unsafe_peek,
            unsafe_poke,
            print_int,
            world_value,
            read_array,
            write_array,
            unsafe_empty_array,
            seq_tick,
            tuple_tick,
            interleave_tick,
            run_seq,
            prim_undefined,
            data_declarations: std::mem::take(&mut self.data_declarations_buf),
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// `a -> a -> a` over the class variable.
    fn bin_op_ty(&mut self, a: TypeId) -> TypeId {
        let inner = self.types.mk_fun(a, a);
        self.types.mk_fun(a, inner)
    }

    /// `a -> a -> result` over the class variable.
    fn cmp_op_ty(&mut self, a: TypeId, result: TypeId) -> TypeId {
        let inner = self.types.mk_fun(a, result);
        self.types.mk_fun(a, inner)
    }

    /// Declare a class method: `forall a. C a => <body(a)>`.
    fn method(
        &mut self,
        name: &str,
        class_symbol: SymbolId,
        body: impl FnOnce(&mut Self, TypeId) -> TypeId,
    ) -> SymbolId {
        let (var_sym, var_ty) = self.sig_var("a", self.star_ty_cache());
        let inner = body(self, var_ty);
        let arity = self.types.fun_args(inner).len();
        let ty = self
            .types
            .mk_for_all(var_sym, vec![class_symbol], inner);
        self.prim_value(name, ty, arity, StateType::Pointwise)
    }

    /// Declare a method over a higher-kinded class variable.
    fn method_hk(
        &mut self,
        name: &str,
        class_symbol: SymbolId,
        var_kind: TypeId,
        body: impl FnOnce(&mut Self, TypeId) -> TypeId,
    ) -> SymbolId {
        let (var_sym, var_ty) = self.sig_var("f", var_kind);
        let inner = body(self, var_ty);
        let arity = self.types.fun_args(inner).len();
        let ty = self
            .types
            .mk_for_all(var_sym, vec![class_symbol], inner);
        self.prim_value(name, ty, arity, StateType::Pointwise)
    }

    fn class_record(
        &mut self,
        class_symbol: SymbolId,
        members: &[SymbolId],
        super_classes: &[SymbolId],
        var_kind: TypeId,
    ) -> ClassId {
        self.class_record_hk(class_symbol, members, super_classes, var_kind)
    }

    fn class_record_hk(
        &mut self,
        class_symbol: SymbolId,
        members: &[SymbolId],
        super_classes: &[SymbolId],
        var_kind: TypeId,
    ) -> ClassId {
        let (class_var, _) = self.sig_var("a", var_kind);
        let class_id = self.classes.insert_class(TypeClass {
            class_symbol,
            class_var,
            members: members.to_vec(),
            super_classes: super_classes.to_vec(),
            ast: None,
        });
        self.symbols.get_mut(class_symbol).type_class = Some(class_id);
        for &member in members {
            self.symbols.get_mut(member).method_type_class = Some(class_id);
        }
        class_id
    }

    /// Register an operator spelling for an existing binding.
    fn alias_operator(&mut self, op: &str, target: SymbolId) {
        let name = self.interner.intern(op);
        let top = self.scopes.top_term;
        self.scopes.insert(top, name, target);
    }

    /// Build a primitive instance `instance C T` whose methods are
    /// primitive bindings named `method@T` with concretized types.
    fn prim_instance(
        &mut self,
        class_symbol: SymbolId,
        data_type_symbol: SymbolId,
        methods: &[(SymbolId, usize)],
        _example_ty: TypeId,
        _bool_ty: TypeId,
    ) {
        let class_name = self.symbols.source_name(class_symbol).clone();
        let data_name = self.symbols.source_name(data_type_symbol).clone();
        let instance_name = self
            .interner
            .intern(&format!("{}@{}", class_name.as_str(), data_name.as_str()));
        let instance_symbol = self.symbols.fresh(
            instance_name,
            self.module_name.clone(),
            SourceSpan::NULL,
        );
        self.insert_type_scope(instance_symbol);

        let data_ty = self.types.mk_con(data_type_symbol, Vec::new());
        let star = self.star_ty_cache();
        self.types.get_mut(data_ty).kind_of = Some(star);

        let mut method_bindings = Vec::with_capacity(methods.len());
        for &(method, arity) in methods {
            let method_name = self.symbols.source_name(method).clone();
            let impl_name = self.interner.intern(&format!(
                "{}@{}",
                method_name.as_str(),
                data_name.as_str()
            ));
            let impl_symbol =
                self.symbols
                    .fresh(impl_name, self.module_name.clone(), SourceSpan::NULL);
            // Concretize the method type at this instance head.
            let method_ty = self.symbols.get(method).ty;
            let concrete_ty = method_ty.map(|ty| self.concretize_at(ty, data_ty));
            let sym = self.symbols.get_mut(impl_symbol);
            sym.ty = concrete_ty;
            sym.is_primitive = true;
            sym.arity = Some(arity);
            sym.state_type = StateType::Pointwise;
            method_bindings.push((method, impl_symbol));
        }

        let instance_id = self.classes.insert_instance(ClassInstance {
            instance_symbol,
            class_symbol,
            data_type_symbol,
            method_bindings,
            ast: None,
        });
        self.symbols.get_mut(instance_symbol).type_class_instance = Some(instance_id);
        self.symbols
            .get_mut(data_type_symbol)
            .instance_list
            .push(instance_id);
    }

    /// Substitute the outermost quantified variable of `ty` with `at`,
    /// instantiating the remaining binders fresh.
    fn concretize_at(&mut self, ty: TypeId, at: TypeId) -> TypeId {
        use crate::types::TypeTerm;
        let stripped = self.types.find_const(ty);
        match self.types.term(stripped).clone() {
            TypeTerm::For { var, body, .. } => {
                let copied = self.types.deep_copy(body);
                self.bind_var_occurrences(copied, var, at);
                copied
            }
            _ => ty,
        }
    }

    fn bind_var_occurrences(&mut self, ty: TypeId, var: SymbolId, to: TypeId) {
        use crate::types::{TypeTerm, TypeVar};
        let ty = self.types.find(ty);
        match self.types.term(ty).clone() {
            TypeTerm::Var(TypeVar {
                symbol: Some(s), ..
            }) if s == var => match &mut self.types.get_mut(ty).term {
                TypeTerm::Var(v) => {
                    v.is_rigid = false;
                    v.bound = Some(to);
                }
                _ => unreachable!(),
            },
            TypeTerm::Var(_) | TypeTerm::Nat(_) | TypeTerm::Sym(_) => {}
            TypeTerm::App { left, right } => {
                self.bind_var_occurrences(left, var, to);
                self.bind_var_occurrences(right, var, to);
            }
            TypeTerm::Fun { arg, result } => {
                self.bind_var_occurrences(arg, var, to);
                self.bind_var_occurrences(result, var, to);
            }
            TypeTerm::Con { args, .. } => {
                for arg in args {
                    self.bind_var_occurrences(arg, var, to);
                }
            }
            TypeTerm::For { body, .. } => self.bind_var_occurrences(body, var, to),
        }
    }

    fn star_ty_cache(&self) -> TypeId {
        self.star_ty.expect("kinds are compiled first")
    }

    /// A data constructor whose full type is already built.
    fn data_con_ty(&mut self, name: &str, ty: TypeId, con_num: usize, arity: usize) -> SymbolId {
        let id = self.symbol(name);
        let sym = self.symbols.get_mut(id);
        sym.ty = Some(ty);
        sym.is_constructor = true;
        sym.is_primitive = true;
        sym.con_num = con_num;
        sym.arity = Some(arity);
        sym.state_type = StateType::Poly;
        self.insert_term_scope(id);
        id
    }

    /// A nullary constructor of an enum type.
    fn data_con(
        &mut self,
        name: &str,
        _data_type: SymbolId,
        result_ty: TypeId,
        _args: &[TypeId],
        con_num: usize,
        is_enum: bool,
    ) -> SymbolId {
        let id = self.data_con_ty(name, result_ty, con_num, 0);
        self.symbols.get_mut(id).is_enum = is_enum;
        id
    }

    /// Record a base data declaration so Core translation lowers it ahead
    /// of user declarations.
    fn emit_data_declaration(&mut self, type_symbol: SymbolId, con_symbols: &[SymbolId]) {
        let span = SourceSpan::NULL;
        let type_conid = self
            .ast
            .create_conid(type_symbol, ConKind::TypeDeclaration, span);
        let simple_type = self.ast.alloc(
            AstKind::SimpleType {
                type_con: type_conid,
                type_vars: Vec::new(),
            },
            span,
        );
        let constructors = con_symbols
            .iter()
            .map(|&con| {
                let conid = self.ast.create_conid(con, ConKind::Var, span);
                self.ast.alloc(
                    AstKind::Constructor {
                        conid,
                        args: Vec::new(),
                    },
                    span,
                )
            })
            .collect();
        let decl = self.ast.alloc(
            AstKind::DataDeclaration {
                symbol: type_symbol,
                simple_type,
                constructors,
                is_recursive: false,
            },
            span,
        );
        self.symbols.get_mut(type_symbol).ast = Some(decl);
        self.data_declarations_buf.push(decl);
    }
}
