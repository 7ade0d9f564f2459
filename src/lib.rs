//! # necroc
//!
//! Front-end and middle-end for the Necro language: a statically-typed,
//! lazily-reactive functional language for real-time audio and signal
//! processing. This crate takes a parsed module from a parse-tree arena
//! to a fully-typed, monomorphic, defunctionalized, state-classified
//! Core IR.
//!
//! ## Module structure (dependency order)
//!
//! ```text
//! pipeline  → The phase driver (A through K, halting on first error)
//!   ↓
//! core      → Core IR: translation, pre-simplify, lambda lift,
//!             defunctionalization, state analysis + deep copies
//!   ↓
//! types     → Type terms, kinds, unification, classes, the base module,
//!             inference, alias/ownership analysis, monomorphization
//!   ↓
//! syntax    → Token/parse-tree interfaces, typed AST, symbols, scopes,
//!             reify, rename, dependency analysis
//!   ↓
//! base      → Primitives (Symbol interning, spans, arenas, options)
//! ```

// ============================================================================
// MODULES (dependency order: base → syntax → types → core → pipeline)
// ============================================================================

/// Foundation types: interning, source positions, arenas, options
pub mod base;

/// Compile errors: one value type, never exceptions
pub mod error;

/// Syntax: parse-tree input, typed AST, scopes, phases A-D
pub mod syntax;

/// Types: the type system, inference, and monomorphization (E-F)
pub mod types;

/// Core IR and the middle-end passes (G-K)
pub mod core;

/// The phase driver
pub mod pipeline;

// Re-export the handful of types embedding drivers need.
pub use base::{CompileOptions, Interner, OptLevel, Phase, SourceLoc, SourceSpan, Symbol};
pub use error::{CompileError, CompileErrorKind};
pub use pipeline::{compile, compile_into, Compilation};
pub use syntax::parse_ast::ParseAstArena;
