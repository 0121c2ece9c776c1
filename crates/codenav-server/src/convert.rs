//! Conversions between wire payloads and the canonical symbol model.
//!
//! Servers answer `textDocument/documentSymbol` in one of two shapes
//! (hierarchical `DocumentSymbol[]` or flat `SymbolInformation[]`), and
//! definition-style responses in three (`Location`, `Location[]`,
//! `LocationLink[]`). Everything is normalized here so the facade never
//! touches raw JSON.

use codenav_symbols::{Position, Range, Symbol, SymbolKind, SymbolLocation};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Parse an LSP `Position`.
pub(crate) fn parse_position(value: &Value) -> Option<Position> {
    Some(Position {
        line: value.get("line")?.as_u64()? as u32,
        character: value.get("character")?.as_u64()? as u32,
    })
}

/// Parse an LSP `Range`.
pub(crate) fn parse_range(value: &Value) -> Option<Range> {
    Some(Range {
        start: parse_position(value.get("start")?)?,
        end: parse_position(value.get("end")?)?,
    })
}

/// Parse a `textDocument/documentSymbol` response into symbol roots.
///
/// `null` and empty arrays mean "no symbols", which is success. Entries
/// that do not parse are skipped rather than failing the whole response.
pub(crate) fn parse_document_symbols(response: &Value, relative_path: &str) -> Vec<Symbol> {
    let Some(items) = response.as_array() else {
        return Vec::new();
    };
    let mut roots: Vec<Symbol> = items
        .iter()
        .filter_map(|item| {
            if item.get("selectionRange").is_some() {
                parse_hierarchical(item, relative_path)
            } else {
                parse_flat(item, relative_path)
            }
        })
        .collect();
    for root in &mut roots {
        root.normalize();
    }
    roots
}

/// `DocumentSymbol` with nested children.
fn parse_hierarchical(item: &Value, relative_path: &str) -> Option<Symbol> {
    let name = item.get("name")?.as_str()?.to_string();
    let kind = SymbolKind::from_lsp(item.get("kind").and_then(Value::as_u64).unwrap_or(0) as u32);
    let range = parse_range(item.get("range")?)?;
    let selection_range = item
        .get("selectionRange")
        .and_then(parse_range)
        .unwrap_or(range);
    let children = item
        .get("children")
        .and_then(Value::as_array)
        .map(|children| {
            children.iter().filter_map(|c| parse_hierarchical(c, relative_path)).collect()
        })
        .unwrap_or_default();

    Some(Symbol {
        name,
        kind,
        detail: item.get("detail").and_then(Value::as_str).map(str::to_string),
        range,
        selection_range,
        location: SymbolLocation { relative_path: relative_path.to_string(), range },
        children,
        body: None,
    })
}

/// `SymbolInformation`: flat, with a `location` instead of nested ranges.
fn parse_flat(item: &Value, relative_path: &str) -> Option<Symbol> {
    let name = item.get("name")?.as_str()?.to_string();
    let kind = SymbolKind::from_lsp(item.get("kind").and_then(Value::as_u64).unwrap_or(0) as u32);
    let range = parse_range(item.get("location")?.get("range")?)?;

    Some(Symbol {
        name,
        kind,
        detail: item.get("containerName").and_then(Value::as_str).map(str::to_string),
        range,
        selection_range: range,
        location: SymbolLocation { relative_path: relative_path.to_string(), range },
        children: Vec::new(),
        body: None,
    })
}

/// Parse a `workspace/symbol` response. Paths are mapped to
/// repository-relative form; results outside the root are kept with their
/// absolute path so standard-library hits stay visible.
pub(crate) fn parse_workspace_symbols(response: &Value, root: &Path) -> Vec<Symbol> {
    let Some(items) = response.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            let kind =
                SymbolKind::from_lsp(item.get("kind").and_then(Value::as_u64).unwrap_or(0) as u32);
            let location = item.get("location")?;
            let range = parse_range(location.get("range")?)?;
            let uri = location.get("uri")?.as_str()?;
            let path = display_path_for_uri(uri, root)?;

            Some(Symbol {
                name,
                kind,
                detail: item.get("containerName").and_then(Value::as_str).map(str::to_string),
                range,
                selection_range: range,
                location: SymbolLocation { relative_path: path, range },
                children: Vec::new(),
                body: None,
            })
        })
        .collect()
}

/// An absolute location parsed from a definition/references response.
pub(crate) struct WireLocation {
    pub absolute_path: PathBuf,
    pub range: Range,
}

/// Parse `Location`, `Location[]`, or `LocationLink[]` responses.
pub(crate) fn parse_locations(response: &Value) -> Vec<WireLocation> {
    match response {
        Value::Array(items) => items.iter().filter_map(parse_one_location).collect(),
        Value::Object(_) => parse_one_location(response).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn parse_one_location(item: &Value) -> Option<WireLocation> {
    // LocationLink carries targetUri/targetSelectionRange; Location
    // carries uri/range.
    let (uri, range_value) = if let Some(target_uri) = item.get("targetUri") {
        let range = item.get("targetSelectionRange").or_else(|| item.get("targetRange"))?;
        (target_uri.as_str()?, range)
    } else {
        (item.get("uri")?.as_str()?, item.get("range")?)
    };
    Some(WireLocation {
        absolute_path: codenav_uri::uri_to_path(uri)?,
        range: parse_range(range_value)?,
    })
}

/// Repository-relative path for in-root URIs, absolute display path for
/// the rest. `None` for non-file URIs.
pub(crate) fn display_path_for_uri(uri: &str, root: &Path) -> Option<String> {
    let absolute = codenav_uri::uri_to_path(uri)?;
    Some(display_path(&absolute, root))
}

/// Repository-relative form when inside the root, absolute otherwise.
pub(crate) fn display_path(absolute: &Path, root: &Path) -> String {
    codenav_uri::to_repository_relative(root, absolute)
        .unwrap_or_else(|| absolute.to_string_lossy().replace('\\', "/"))
}
