//! Workspace edits and hover payloads in repository-relative form.

use crate::convert::{display_path_for_uri, parse_range};
use codenav_symbols::Range;
use serde_json::Value;
use std::path::Path;

/// A single text replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEdit {
    /// Range to replace.
    pub range: Range,
    /// Replacement text.
    pub new_text: String,
}

/// All edits for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEdits {
    /// Repository-relative path of the document.
    pub relative_path: String,
    /// Edits in server order.
    pub edits: Vec<TextEdit>,
}

/// A rename result: per-document lists of text edits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkspaceEdit {
    /// Documents touched by the edit.
    pub documents: Vec<DocumentEdits>,
}

/// Hover contents with their declared format.
#[derive(Debug, Clone, PartialEq)]
pub struct Hover {
    /// `markdown` or `plaintext`.
    pub kind: String,
    /// The hover text.
    pub value: String,
}

/// Parse a `WorkspaceEdit` wire value. Handles both the `changes` map and
/// `documentChanges` array forms; returns `None` for `null`.
pub(crate) fn parse_workspace_edit(value: &Value, root: &Path) -> Option<WorkspaceEdit> {
    if value.is_null() {
        return None;
    }
    let mut documents = Vec::new();

    if let Some(changes) = value.get("changes").and_then(Value::as_object) {
        for (uri, edits) in changes {
            if let Some(doc) = parse_document_edits(uri, edits, root) {
                documents.push(doc);
            }
        }
    }

    if let Some(doc_changes) = value.get("documentChanges").and_then(Value::as_array) {
        for change in doc_changes {
            // Create/rename/delete file operations are not text edits;
            // only entries with a textDocument apply here.
            let Some(uri) = change
                .get("textDocument")
                .and_then(|d| d.get("uri"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(edits) = change.get("edits") else { continue };
            if let Some(doc) = parse_document_edits(uri, edits, root) {
                documents.push(doc);
            }
        }
    }

    Some(WorkspaceEdit { documents })
}

fn parse_document_edits(uri: &str, edits: &Value, root: &Path) -> Option<DocumentEdits> {
    let relative_path = display_path_for_uri(uri, root)?;
    let edits = edits
        .as_array()?
        .iter()
        .filter_map(|edit| {
            Some(TextEdit {
                range: parse_range(edit.get("range")?)?,
                new_text: edit.get("newText")?.as_str()?.to_string(),
            })
        })
        .collect();
    Some(DocumentEdits { relative_path, edits })
}

/// Parse hover contents: a plain string, a `MarkupContent`, a
/// `MarkedString`, or an array of either.
pub(crate) fn parse_hover(value: &Value) -> Option<Hover> {
    if value.is_null() {
        return None;
    }
    let contents = value.get("contents")?;
    let (kind, value) = flatten_hover_contents(contents)?;
    Some(Hover { kind, value })
}

fn flatten_hover_contents(contents: &Value) -> Option<(String, String)> {
    match contents {
        Value::String(text) => Some(("plaintext".to_string(), text.clone())),
        Value::Object(obj) => {
            if let Some(kind) = obj.get("kind").and_then(Value::as_str) {
                let text = obj.get("value")?.as_str()?.to_string();
                Some((kind.to_string(), text))
            } else if let Some(language) = obj.get("language").and_then(Value::as_str) {
                let code = obj.get("value")?.as_str()?;
                Some(("markdown".to_string(), format!("```{}\n{}\n```", language, code)))
            } else {
                None
            }
        }
        Value::Array(parts) => {
            let texts: Vec<String> =
                parts.iter().filter_map(|p| flatten_hover_contents(p).map(|(_, v)| v)).collect();
            if texts.is_empty() { None } else { Some(("markdown".to_string(), texts.join("\n\n"))) }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn root() -> PathBuf {
        PathBuf::from(if cfg!(windows) { r"C:\repo" } else { "/repo" })
    }

    fn uri(rel: &str) -> String {
        codenav_uri::path_to_uri(root().join(rel)).unwrap()
    }

    #[test]
    fn parses_changes_map() {
        let mut changes = serde_json::Map::new();
        changes.insert(
            uri("src/a.ts"),
            json!([{
                "range": {"start": {"line": 1, "character": 4}, "end": {"line": 1, "character": 7}},
                "newText": "renamed",
            }]),
        );
        let value = json!({ "changes": changes });
        let edit = parse_workspace_edit(&value, &root()).unwrap();
        assert_eq!(edit.documents.len(), 1);
        assert_eq!(edit.documents[0].relative_path, "src/a.ts");
        assert_eq!(edit.documents[0].edits[0].new_text, "renamed");
    }

    #[test]
    fn parses_document_changes_array() {
        let value = json!({
            "documentChanges": [{
                "textDocument": {"uri": uri("src/b.ts"), "version": 4},
                "edits": [{
                    "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}},
                    "newText": "new",
                }],
            }]
        });
        let edit = parse_workspace_edit(&value, &root()).unwrap();
        assert_eq!(edit.documents[0].relative_path, "src/b.ts");
    }

    #[test]
    fn null_edit_is_none() {
        assert!(parse_workspace_edit(&Value::Null, &root()).is_none());
    }

    #[test]
    fn hover_string_and_markup_forms() {
        let plain = json!({"contents": "a docstring"});
        assert_eq!(parse_hover(&plain).unwrap().value, "a docstring");

        let markup = json!({"contents": {"kind": "markdown", "value": "**bold**"}});
        let hover = parse_hover(&markup).unwrap();
        assert_eq!(hover.kind, "markdown");
        assert_eq!(hover.value, "**bold**");
    }

    #[test]
    fn hover_marked_string_array_is_joined() {
        let value = json!({"contents": [
            {"language": "python", "value": "def f(): ..."},
            "explanation",
        ]});
        let hover = parse_hover(&value).unwrap();
        assert!(hover.value.contains("```python"));
        assert!(hover.value.contains("explanation"));
    }

    #[test]
    fn null_hover_is_none() {
        assert!(parse_hover(&Value::Null).is_none());
    }
}
