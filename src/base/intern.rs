//! String interner for symbol storage and comparison.
//!
//! A [`Symbol`] is a uniquely-interned string plus its precomputed hash.
//! Interning the same string twice returns an equal `Symbol` sharing the
//! same backing allocation, so equality checks compare the hash first and
//! almost never touch the string data.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};
use smol_str::SmolStr;

/// A uniquely-interned string plus its hash. Cheap to clone.
#[derive(Clone, Eq)]
pub struct Symbol {
    text: SmolStr,
    hash: u64,
}

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The precomputed hash of the symbol text.
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.text == other.text
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.text)
    }
}

/// String interner that deduplicates symbol text.
///
/// Owned by the compilation session and passed by mutable reference, never a
/// module-level singleton. Base-module symbols are interned first; the user
/// phases only read them and add fresh entries.
#[derive(Debug, Default)]
pub struct Interner {
    strings: FxHashSet<SmolStr>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its `Symbol`.
    pub fn intern(&mut self, s: &str) -> Symbol {
        let text = match self.strings.get(s) {
            Some(existing) => existing.clone(),
            None => {
                let small = SmolStr::new(s);
                self.strings.insert(small.clone());
                small
            }
        };
        let mut hasher = FxHasher::default();
        text.as_str().hash(&mut hasher);
        Symbol {
            hash: hasher.finish(),
            text,
        }
    }

    /// Intern the concatenation of two symbols, used for mangled names and
    /// instance lookups (`Class@Data`, `name<Int>`).
    pub fn concat(&mut self, a: &Symbol, b: &Symbol) -> Symbol {
        let joined = format!("{}{}", a.as_str(), b.as_str());
        self.intern(&joined)
    }

    /// Number of unique strings interned.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_equal_symbols() {
        let mut interner = Interner::new();
        let a = interner.intern("osc");
        let b = interner.intern("osc");
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_intern_distinct_symbols() {
        let mut interner = Interner::new();
        let a = interner.intern("sin");
        let b = interner.intern("saw");
        assert_ne!(a, b);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_concat() {
        let mut interner = Interner::new();
        let class = interner.intern("Num@");
        let data = interner.intern("Int");
        let joined = interner.concat(&class, &data);
        assert_eq!(joined.as_str(), "Num@Int");
        assert_eq!(joined, interner.intern("Num@Int"));
    }
}
