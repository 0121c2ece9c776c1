//! The canonical, language-agnostic symbol representation.

use crate::kind::SymbolKind;
use crate::position::{Position, Range};
use serde::{Deserialize, Serialize};

/// Where a symbol or reference lives, in repository-relative form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolLocation {
    /// Repository-relative path with forward slashes. Definitions that fall
    /// outside the repository (standard libraries) carry an absolute path
    /// here instead.
    pub relative_path: String,
    /// Range of the symbol or occurrence.
    pub range: Range,
}

/// A named construct in source: function, class, field, module, and so on.
///
/// Invariants maintained by [`Symbol::normalize`]:
/// - `selection_range ⊆ range`
/// - every child's `range ⊆ range`
/// - `name` is non-empty (empty names are given a placeholder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Display name of the symbol.
    pub name: String,
    /// Classified kind; unknown wire values land in [`SymbolKind::Other`].
    pub kind: SymbolKind,
    /// Optional server-provided detail (signature, type).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Full extent of the symbol.
    pub range: Range,
    /// Subrange identifying the defining identifier.
    pub selection_range: Range,
    /// Location of the symbol.
    pub location: SymbolLocation,
    /// Nested symbols, in server order.
    #[serde(default)]
    pub children: Vec<Symbol>,
    /// Verbatim buffer text of `range`, populated on request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Symbol {
    /// Enforce the structural invariants on this symbol and its subtree.
    ///
    /// Selection ranges that escape their symbol range are clamped; child
    /// ranges that escape the parent are clamped likewise; empty names get
    /// a `<anonymous>` placeholder.
    pub fn normalize(&mut self) {
        if self.name.is_empty() {
            self.name = "<anonymous>".to_string();
        }
        clamp_into(&mut self.selection_range, &self.range);
        for child in &mut self.children {
            clamp_into(&mut child.range, &self.range);
            child.normalize();
        }
    }

    /// Depth-first flattening of this symbol and all descendants.
    pub fn flatten(&self) -> Vec<&Symbol> {
        let mut out = Vec::new();
        self.collect_flat(&mut out);
        out
    }

    fn collect_flat<'a>(&'a self, out: &mut Vec<&'a Symbol>) {
        out.push(self);
        for child in &self.children {
            child.collect_flat(out);
        }
    }

    /// The deepest symbol in this subtree whose range encloses `pos`, if any.
    pub fn find_containing(&self, pos: Position) -> Option<&Symbol> {
        if !self.range.contains(pos) {
            return None;
        }
        let mut best: &Symbol = self;
        loop {
            let deeper = best
                .children
                .iter()
                .filter(|c| c.range.contains(pos))
                .min_by_key(|c| c.range.span_key());
            match deeper {
                Some(child) => best = child,
                None => return Some(best),
            }
        }
    }
}

/// The deepest symbol across a forest of root symbols that encloses `pos`.
///
/// Ties between roots are broken by preferring the smallest enclosing range,
/// which also prefers the most deeply nested match.
pub fn find_containing<'a>(roots: &'a [Symbol], pos: Position) -> Option<&'a Symbol> {
    roots
        .iter()
        .filter_map(|root| root.find_containing(pos))
        .min_by_key(|s| s.range.span_key())
}

fn clamp_into(inner: &mut Range, outer: &Range) {
    if inner.start < outer.start {
        inner.start = outer.start;
    }
    if inner.end > outer.end {
        inner.end = outer.end;
    }
    if inner.start > inner.end {
        inner.start = inner.end;
    }
}

/// An occurrence of a symbol somewhere in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Location of the occurrence.
    pub location: SymbolLocation,
    /// The symbol whose range contains the occurrence, when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containing_symbol: Option<Symbol>,
}
