//! Call hierarchy as an index-addressed graph.
//!
//! LSP call hierarchies are cyclic (recursion, mutual calls), so the graph
//! is an arena of nodes with stable integer ids and explicit edges rather
//! than an owned tree. Traversal keeps a visited set keyed by
//! `(uri, start line, name)`; servers sometimes report slightly different
//! ranges for the same caller between calls, and the loose key keeps such
//! near-duplicates from inflating the graph or breaking cycle detection.

use codenav_symbols::{Range, SymbolKind, SymbolLocation};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::convert::parse_range;

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    /// Who calls the subject (`callHierarchy/incomingCalls`).
    Incoming,
    /// Whom the subject calls (`callHierarchy/outgoingCalls`).
    Outgoing,
}

/// One function/method in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    /// Display name.
    pub name: String,
    /// Symbol kind.
    pub kind: SymbolKind,
    /// Optional server-provided detail.
    pub detail: Option<String>,
    /// Where the node is defined.
    pub location: SymbolLocation,
}

/// A call relation between two nodes, with the concrete call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEdge {
    /// Arena id of the caller.
    pub from: usize,
    /// Arena id of the callee.
    pub to: usize,
    /// Ranges of the call expressions, in the caller's file.
    pub call_sites: Vec<Range>,
}

/// A call graph rooted at one symbol. `nodes[0]` is the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallGraph {
    /// Node arena; ids are indices and stable for the graph's lifetime.
    pub nodes: Vec<CallNode>,
    /// Edges between arena ids; always directed caller → callee.
    pub edges: Vec<CallEdge>,
}

impl CallGraph {
    /// Node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Visited-set key tolerating range jitter between server responses.
type VisitKey = (String, u32, String);

/// Builds a [`CallGraph`] breadth-first from call hierarchy responses.
///
/// The builder is transport-agnostic: the facade feeds it wire items and
/// it hands back which items still need expansion, so the RPC loop stays
/// in the facade while dedupe and cycle handling live here.
pub(crate) struct CallGraphBuilder {
    graph: CallGraph,
    visited: HashMap<VisitKey, usize>,
    queue: VecDeque<(usize, Value, u32)>,
    max_depth: u32,
}

impl CallGraphBuilder {
    /// Start a graph from the root call hierarchy item.
    pub(crate) fn new(root_item: Value, root_node: CallNode, max_depth: u32) -> Self {
        let mut graph = CallGraph::default();
        let mut visited = HashMap::new();
        visited.insert(visit_key_of(&root_node), 0);
        graph.nodes.push(root_node);

        let mut queue = VecDeque::new();
        queue.push_back((0usize, root_item, 0u32));
        Self { graph, visited, queue, max_depth }
    }

    /// Next `(node id, wire item)` to expand, or `None` when done.
    pub(crate) fn next_pending(&mut self) -> Option<(usize, Value, u32)> {
        self.queue.pop_front()
    }

    /// Record one neighbor reported for `from_id`. Returns the neighbor's
    /// arena id. Already-visited nodes (cycles, range jitter) get an edge
    /// but are not queued again.
    pub(crate) fn add_neighbor(
        &mut self,
        from_id: usize,
        depth: u32,
        node: CallNode,
        wire_item: Value,
        call_sites: Vec<Range>,
        direction: CallDirection,
    ) -> usize {
        let key = visit_key_of(&node);
        let (to_id, first_visit) = match self.visited.get(&key) {
            Some(&existing) => (existing, false),
            None => {
                let id = self.graph.nodes.len();
                self.graph.nodes.push(node);
                self.visited.insert(key, id);
                (id, true)
            }
        };

        let (from, to) = match direction {
            // Incoming: the neighbor calls us.
            CallDirection::Incoming => (to_id, from_id),
            // Outgoing: we call the neighbor.
            CallDirection::Outgoing => (from_id, to_id),
        };
        self.graph.edges.push(CallEdge { from, to, call_sites });

        if first_visit && depth + 1 < self.max_depth {
            self.queue.push_back((to_id, wire_item, depth + 1));
        }
        to_id
    }

    pub(crate) fn finish(self) -> CallGraph {
        self.graph
    }
}

fn visit_key_of(node: &CallNode) -> VisitKey {
    (
        node.location.relative_path.clone(),
        node.location.range.start.line,
        node.name.clone(),
    )
}

/// Parse one wire `CallHierarchyItem` into a node, mapping its URI to
/// display form against `root`.
pub(crate) fn parse_call_item(item: &Value, root: &std::path::Path) -> Option<CallNode> {
    let name = item.get("name")?.as_str()?.to_string();
    let kind = SymbolKind::from_lsp(item.get("kind").and_then(Value::as_u64).unwrap_or(0) as u32);
    let uri = item.get("uri")?.as_str()?;
    let range = parse_range(item.get("selectionRange").or_else(|| item.get("range"))?)?;
    let relative_path = crate::convert::display_path_for_uri(uri, root)?;
    Some(CallNode {
        name,
        kind,
        detail: item.get("detail").and_then(Value::as_str).map(str::to_string),
        location: SymbolLocation { relative_path, range },
    })
}

/// Parse the `fromRanges` of an incoming/outgoing call entry.
pub(crate) fn parse_call_sites(entry: &Value) -> Vec<Range> {
    entry
        .get("fromRanges")
        .and_then(Value::as_array)
        .map(|ranges| ranges.iter().filter_map(parse_range).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codenav_symbols::Position;
    use serde_json::json;

    fn node(name: &str, path: &str, line: u32) -> CallNode {
        CallNode {
            name: name.to_string(),
            kind: SymbolKind::Function,
            detail: None,
            location: SymbolLocation {
                relative_path: path.to_string(),
                range: Range::new(line, 0, line, 10),
            },
        }
    }

    #[test]
    fn cycles_terminate_with_back_edge() {
        // a -> b -> a: the second visit of `a` adds an edge, not a node.
        let mut builder = CallGraphBuilder::new(json!({}), node("a", "src/m.rs", 1), 10);

        let (root_id, _, depth) = builder.next_pending().unwrap();
        builder.add_neighbor(
            root_id,
            depth,
            node("b", "src/m.rs", 5),
            json!({}),
            vec![Range::new(2, 4, 2, 5)],
            CallDirection::Outgoing,
        );

        let (b_id, _, depth) = builder.next_pending().unwrap();
        builder.add_neighbor(
            b_id,
            depth,
            node("a", "src/m.rs", 1),
            json!({}),
            vec![Range::new(6, 4, 6, 5)],
            CallDirection::Outgoing,
        );

        // Nothing left to expand: `a` was already visited.
        assert!(builder.next_pending().is_none());

        let graph = builder.finish();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0], CallEdge { from: 0, to: 1, call_sites: vec![Range::new(2, 4, 2, 5)] });
        assert_eq!(graph.edges[1].from, 1);
        assert_eq!(graph.edges[1].to, 0);
    }

    #[test]
    fn range_jitter_on_same_caller_is_deduplicated() {
        let mut builder = CallGraphBuilder::new(json!({}), node("root", "src/m.rs", 0), 10);
        let (root_id, _, depth) = builder.next_pending().unwrap();

        // Same (path, start line, name), slightly different end column.
        let mut jittered = node("helper", "src/m.rs", 8);
        let first = builder.add_neighbor(
            root_id,
            depth,
            jittered.clone(),
            json!({}),
            Vec::new(),
            CallDirection::Incoming,
        );
        jittered.location.range.end.character += 2;
        let second = builder.add_neighbor(
            root_id,
            depth,
            jittered,
            json!({}),
            Vec::new(),
            CallDirection::Incoming,
        );

        assert_eq!(first, second);
        let graph = builder.finish();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn incoming_direction_points_edge_at_subject() {
        let mut builder = CallGraphBuilder::new(json!({}), node("callee", "src/m.rs", 0), 10);
        let (root_id, _, depth) = builder.next_pending().unwrap();
        let caller_id = builder.add_neighbor(
            root_id,
            depth,
            node("caller", "src/m.rs", 20),
            json!({}),
            Vec::new(),
            CallDirection::Incoming,
        );

        let graph = builder.finish();
        assert_eq!(graph.edges[0].from, caller_id);
        assert_eq!(graph.edges[0].to, 0);
    }

    #[test]
    fn max_depth_bounds_expansion() {
        let mut builder = CallGraphBuilder::new(json!({}), node("root", "src/m.rs", 0), 1);
        let (root_id, _, depth) = builder.next_pending().unwrap();
        builder.add_neighbor(
            root_id,
            depth,
            node("next", "src/m.rs", 9),
            json!({}),
            Vec::new(),
            CallDirection::Outgoing,
        );
        // Depth 1 reached: the neighbor is recorded but never queued.
        assert!(builder.next_pending().is_none());
    }

    #[test]
    fn parses_wire_item() {
        let root = std::path::PathBuf::from(if cfg!(windows) { r"C:\repo" } else { "/repo" });
        let uri = codenav_uri::path_to_uri(root.join("src/lib.rs")).unwrap();
        let item = json!({
            "name": "run",
            "kind": 12,
            "uri": uri,
            "range": {"start": {"line": 3, "character": 0}, "end": {"line": 9, "character": 1}},
            "selectionRange": {"start": {"line": 3, "character": 3}, "end": {"line": 3, "character": 6}},
        });
        let node = parse_call_item(&item, &root).unwrap();
        assert_eq!(node.name, "run");
        assert_eq!(node.location.relative_path, "src/lib.rs");
        assert_eq!(node.location.range.start, Position::new(3, 3));
    }
}
