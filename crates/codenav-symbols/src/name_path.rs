//! Name paths: qualified symbol names and their lookup patterns.
//!
//! A symbol's qualified name is the chain of names from its outermost
//! ancestor down to itself, written `Outer/Inner/name`. Patterns use the
//! same syntax with two extensions: a leading `/` anchors the pattern at the
//! symbol root, and any component may carry `[N]` to select the N-th
//! overload among same-named siblings.

use serde::{Deserialize, Serialize};

/// One component of a qualified name or pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamePathComponent {
    /// Component name.
    pub name: String,
    /// Overload index among same-named siblings, when disambiguation is
    /// needed. `None` is equivalent to index 0 for matching.
    pub overload: Option<u32>,
}

impl NamePathComponent {
    /// A plain component without an overload index.
    pub fn plain(name: impl Into<String>) -> Self {
        Self { name: name.into(), overload: None }
    }
}

/// A parsed lookup pattern over qualified names.
///
/// Syntax:
/// - components separated by `/`
/// - leading `/` anchors the pattern at the root (absolute)
/// - trailing `/` is permitted and ignored
/// - `name[2]` selects overload index 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePathPattern {
    components: Vec<NamePathComponent>,
    absolute: bool,
}

impl NamePathPattern {
    /// Parse a pattern string. Empty patterns (only slashes, or the empty
    /// string) yield `None`.
    pub fn parse(pattern: &str) -> Option<Self> {
        let absolute = pattern.starts_with('/');
        let trimmed = pattern.trim_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        let mut components = Vec::new();
        for part in trimmed.split('/') {
            if part.is_empty() {
                return None; // "a//b" is malformed
            }
            components.push(parse_component(part));
        }
        Some(Self { components, absolute })
    }

    /// Whether the pattern is anchored at the symbol root.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// The parsed components.
    pub fn components(&self) -> &[NamePathComponent] {
        &self.components
    }

    /// Match this pattern against a symbol's full qualified chain
    /// (outermost ancestor first, the symbol itself last).
    ///
    /// - Absolute patterns require the entire chain to match, component for
    ///   component.
    /// - Relative patterns match any suffix of the chain ending at the
    ///   symbol itself.
    /// - Non-last components must match names exactly; the last component
    ///   matches exactly, or by substring when `substring` is set.
    /// - A component's overload index, when present, must equal the chain
    ///   component's index (`None` counts as 0 on both sides).
    pub fn matches(&self, chain: &[NamePathComponent], substring: bool) -> bool {
        if self.components.len() > chain.len() {
            return false;
        }
        if self.absolute && self.components.len() != chain.len() {
            return false;
        }

        let offset = chain.len() - self.components.len();
        let last = self.components.len() - 1;
        for (i, pat) in self.components.iter().enumerate() {
            let subject = &chain[offset + i];
            let name_ok = if i == last && substring {
                subject.name.contains(&pat.name)
            } else {
                subject.name == pat.name
            };
            if !name_ok {
                return false;
            }
            if let Some(wanted) = pat.overload {
                if subject.overload.unwrap_or(0) != wanted {
                    return false;
                }
            }
        }
        true
    }
}

fn parse_component(part: &str) -> NamePathComponent {
    if let Some(open) = part.rfind('[') {
        if part.ends_with(']') {
            let index_str = &part[open + 1..part.len() - 1];
            if let Ok(index) = index_str.parse::<u32>() {
                return NamePathComponent { name: part[..open].to_string(), overload: Some(index) };
            }
        }
    }
    NamePathComponent::plain(part)
}

/// Assign overload indices to a sequence of sibling names.
///
/// Names that occur more than once get indices `0, 1, 2, ...` in order of
/// appearance; unique names keep `overload: None`.
pub fn assign_overload_indices(names: &[&str]) -> Vec<NamePathComponent> {
    use std::collections::HashMap;
    let mut totals: HashMap<&str, u32> = HashMap::new();
    for name in names {
        *totals.entry(name).or_insert(0) += 1;
    }
    let mut seen: HashMap<&str, u32> = HashMap::new();
    names
        .iter()
        .map(|name| {
            let index = seen.entry(name).or_insert(0);
            let component = if totals[name] > 1 {
                NamePathComponent { name: (*name).to_string(), overload: Some(*index) }
            } else {
                NamePathComponent::plain(*name)
            };
            *index += 1;
            component
        })
        .collect()
}
