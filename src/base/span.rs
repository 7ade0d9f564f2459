//! Source positions.
//!
//! Every AST and Core node carries a [`SourceSpan`]: start and end
//! [`SourceLoc`]s. Locations keep both the byte offset (for range math) and
//! the line/column pair (for human-facing diagnostics).

use std::fmt;

use text_size::{TextRange, TextSize};

/// A single position in the source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SourceLoc {
    /// Byte offset from the start of the file.
    pub offset: TextSize,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed column.
    pub col: u32,
}

impl SourceLoc {
    pub const NULL: SourceLoc = SourceLoc {
        offset: TextSize::new(0),
        line: 0,
        col: 0,
    };

    pub fn new(offset: u32, line: u32, col: u32) -> Self {
        SourceLoc {
            offset: TextSize::new(offset),
            line,
            col,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A half-open source region between two locations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: SourceLoc,
    pub end: SourceLoc,
}

impl SourceSpan {
    pub const NULL: SourceSpan = SourceSpan {
        start: SourceLoc::NULL,
        end: SourceLoc::NULL,
    };

    pub fn new(start: SourceLoc, end: SourceLoc) -> Self {
        SourceSpan { start, end }
    }

    pub fn text_range(&self) -> TextRange {
        TextRange::new(self.start.offset, self.end.offset)
    }

    /// Join two spans into the smallest span covering both.
    pub fn cover(self, other: SourceSpan) -> SourceSpan {
        let start = if other.start.offset < self.start.offset {
            other.start
        } else {
            self.start
        };
        let end = if other.end.offset > self.end.offset {
            other.end
        } else {
            self.end
        };
        SourceSpan { start, end }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover() {
        let a = SourceSpan::new(SourceLoc::new(4, 1, 5), SourceLoc::new(8, 1, 9));
        let b = SourceSpan::new(SourceLoc::new(12, 2, 1), SourceLoc::new(20, 2, 9));
        let joined = a.cover(b);
        assert_eq!(joined.start, a.start);
        assert_eq!(joined.end, b.end);
    }
}
