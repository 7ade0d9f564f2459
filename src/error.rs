//! Compile errors.
//!
//! Every fallible phase returns `Result<T, CompileError>`; errors are
//! values, never panics. Type-shaped operands are rendered to strings at
//! construction time so the error type stays independent of the arenas it
//! was raised from. Human-facing formatting beyond [`std::fmt::Display`] is
//! the embedding driver's job.

use thiserror::Error;

use crate::base::SourceSpan;

/// The kind of a compile error, with its type-shaped operands rendered.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("variable not in scope: {name}")]
    NotInScope { name: String },

    #[error("duplicate declaration: {name}")]
    DuplicateDeclaration { name: String },

    #[error("couldn't match type `{left}` with type `{right}`")]
    MismatchedType { left: String, right: String },

    #[error("occurs check: cannot construct the infinite type `{var} ~ {ty}`")]
    OccursCheck { var: String, ty: String },

    #[error("cannot bind rigid type variable `{var}` to `{ty}`")]
    RigidTypeVariable { var: String, ty: String },

    #[error("couldn't match kind `{left}` with kind `{right}`")]
    KindMismatch { left: String, right: String },

    #[error("type constructor `{con}` applied to {actual} arguments, but its kind takes {expected}")]
    KindMismatchedArity {
        con: String,
        expected: usize,
        actual: usize,
    },

    #[error("ambiguous type variable `{var}` in type `{ty}`")]
    AmbiguousTypeVariable { var: String, ty: String },

    #[error("initializer on non-recursive binding `{name}`")]
    NonRecursiveInitializedValue { name: String },

    #[error("initializer on binding `{name}` whose type `{ty}` is not zero-order")]
    NonConcreteInitializedValue { name: String, ty: String },

    #[error("no instance of class `{class}` for type `{ty}`")]
    MissingInstance { class: String, ty: String },

    #[error("unique value `{name}` used after being consumed")]
    UniquenessViolation { name: String },

    #[error("non-exhaustive patterns in case expression of type `{ty}`")]
    NonExhaustivePatterns { ty: String },
}

/// A compile error: the kind plus where it was raised.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{span}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: SourceSpan,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: SourceSpan) -> Self {
        CompileError { kind, span }
    }

    pub fn not_in_scope(name: impl Into<String>, span: SourceSpan) -> Self {
        CompileError::new(
            CompileErrorKind::NotInScope { name: name.into() },
            span,
        )
    }

    pub fn duplicate_declaration(name: impl Into<String>, span: SourceSpan) -> Self {
        CompileError::new(
            CompileErrorKind::DuplicateDeclaration { name: name.into() },
            span,
        )
    }
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_operands() {
        let err = CompileError::new(
            CompileErrorKind::MismatchedType {
                left: "Int".into(),
                right: "Float".into(),
            },
            SourceSpan::NULL,
        );
        let rendered = err.to_string();
        assert!(rendered.contains("Int"));
        assert!(rendered.contains("Float"));
    }
}
