//! Per-language behavior hooks.
//!
//! The facade is generic; everything a particular server needs done
//! differently (lazy-index wait, symbol name cleanup, range adjustments,
//! extra ignored directories, definition preference) comes through this
//! trait. Defaults are identity, so a policy only overrides what its
//! server actually deviates on.

use codenav_symbols::{Symbol, SymbolLocation};
use std::borrow::Cow;
use std::time::Duration;

/// Language-specific behavior supplied to a facade at construction.
pub trait LanguagePolicy: Send + Sync {
    /// Wait applied once per session before the first cross-file request,
    /// for servers that index lazily.
    fn cross_file_wait(&self) -> Duration {
        Duration::ZERO
    }

    /// Normalize a server-reported symbol name to its display identifier.
    /// Some servers prefix metadata (object numbers, quoting); the default
    /// keeps the name as-is.
    fn normalize_symbol_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(name)
    }

    /// Post-process a file's symbol roots against the live buffer.
    ///
    /// The stock implementation is a no-op. Servers that report
    /// expression-level ranges may extend each symbol to cover a trailing
    /// terminator; [`extend_ranges_over_terminator`] does that consistently
    /// for symbol and children.
    fn postprocess_symbols(&self, _symbols: &mut [Symbol], _buffer: &str) {}

    /// Directory names never descended into during repository walks, in
    /// addition to the configured ignore patterns.
    fn ignored_dirnames(&self) -> &[&str] {
        &[".git", "node_modules", "target", "dist", "build", "__pycache__", ".venv"]
    }

    /// Pick one definition when the server returns several. The default
    /// prefers the first location outside any dependency directory.
    fn preferred_definition(&self, definitions: &[SymbolLocation]) -> usize {
        definitions
            .iter()
            .position(|d| !self.is_dependency_location(&d.relative_path))
            .unwrap_or(0)
    }

    /// Whether a path points into installed dependencies rather than the
    /// repository's own sources.
    fn is_dependency_location(&self, path: &str) -> bool {
        path.split('/').any(|segment| {
            matches!(segment, "node_modules" | "site-packages" | "vendor" | ".cargo")
        })
    }
}

/// The identity policy, used when a language needs nothing special.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl LanguagePolicy for DefaultPolicy {}

/// Extend every symbol whose range stops just short of `terminator` so the
/// range includes it, keeping children consistent. Helps servers that
/// report expression-level ranges where statement-level ranges are needed
/// for replacement edits.
pub fn extend_ranges_over_terminator(symbols: &mut [Symbol], buffer: &str, terminator: char) {
    let lines: Vec<&str> = buffer.split('\n').collect();
    for symbol in symbols {
        extend_one(symbol, &lines, terminator);
    }
}

fn extend_one(symbol: &mut Symbol, lines: &[&str], terminator: char) {
    let end = symbol.range.end;
    if let Some(line) = lines.get(end.line as usize) {
        let byte = codenav_symbols::utf16_col_to_byte(line, end.character);
        if line[byte..].starts_with(terminator) {
            symbol.range.end.character += 1;
            symbol.location.range = symbol.range;
        }
    }
    for child in &mut symbol.children {
        extend_one(child, lines, terminator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codenav_symbols::{Range, SymbolKind};

    fn symbol(range: Range) -> Symbol {
        Symbol {
            name: "value".to_string(),
            kind: SymbolKind::Variable,
            detail: None,
            range,
            selection_range: range,
            location: SymbolLocation { relative_path: "default.nix".to_string(), range },
            children: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn default_policy_is_identity() {
        let policy = DefaultPolicy;
        assert_eq!(policy.cross_file_wait(), Duration::ZERO);
        assert_eq!(policy.normalize_symbol_name("Widget"), "Widget");
    }

    #[test]
    fn preferred_definition_skips_dependency_dirs() {
        let policy = DefaultPolicy;
        let range = Range::new(0, 0, 0, 1);
        let defs = vec![
            SymbolLocation { relative_path: "node_modules/lib/shim.d.ts".to_string(), range },
            SymbolLocation { relative_path: "src/utils.ts".to_string(), range },
        ];
        assert_eq!(policy.preferred_definition(&defs), 1);
    }

    #[test]
    fn preferred_definition_falls_back_to_first() {
        let policy = DefaultPolicy;
        let range = Range::new(0, 0, 0, 1);
        let defs = vec![
            SymbolLocation { relative_path: "node_modules/a.d.ts".to_string(), range },
            SymbolLocation { relative_path: "node_modules/b.d.ts".to_string(), range },
        ];
        assert_eq!(policy.preferred_definition(&defs), 0);
    }

    #[test]
    fn terminator_extension_covers_semicolon() {
        let buffer = "x = 1;\ny = 2\n";
        let mut symbols = vec![symbol(Range::new(0, 0, 0, 5)), symbol(Range::new(1, 0, 1, 5))];
        extend_ranges_over_terminator(&mut symbols, buffer, ';');

        // First symbol gains the semicolon; second ends at end of line
        // already and is untouched.
        assert_eq!(symbols[0].range.end.character, 6);
        assert_eq!(symbols[0].location.range, symbols[0].range);
        assert_eq!(symbols[1].range.end.character, 5);
    }

    #[test]
    fn terminator_extension_updates_children() {
        let buffer = "outer = { inner = 1; };\n";
        let mut root = symbol(Range::new(0, 0, 0, 22));
        root.children.push(symbol(Range::new(0, 10, 0, 19)));
        let mut symbols = vec![root];
        extend_ranges_over_terminator(&mut symbols, buffer, ';');

        assert_eq!(symbols[0].range.end.character, 23);
        assert_eq!(symbols[0].children[0].range.end.character, 20);
    }
}
