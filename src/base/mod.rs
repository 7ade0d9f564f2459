//! Foundation types for the Necro compiler.
//!
//! This module provides the fundamental types used by every phase:
//! - [`Symbol`], [`Interner`] - string interning
//! - [`SourceLoc`], [`SourceSpan`] - source positions
//! - [`Arena`], [`Idx`] - typed-index arenas (all trees live in these)
//! - [`CompileOptions`], [`Phase`] - pipeline configuration
//!
//! This module has NO dependencies on other necroc modules.

mod arena;
mod intern;
mod options;
mod span;

pub use arena::{Arena, Idx};
pub use intern::{Interner, Symbol};
pub use options::{CompileOptions, OptLevel, Phase};
pub use span::{SourceLoc, SourceSpan};

// Re-export text-size types for convenience
pub use text_size::{TextRange, TextSize};
