//! Citation graph store
//!
//! Arena of resolved publication nodes with deduplicated directed edges
//! (citing -> cited) and an identifier index used for identity resolution.

use citegraph_common::errors::{AppError, Result};
use citegraph_common::record::{Identifier, PublicationRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Arena index of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// How a node entered the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Seed,
    Discovered,
}

/// Citation ids a merge added to a node's known lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Absorbed {
    pub references: BTreeSet<Identifier>,
    pub cited_by: BTreeSet<Identifier>,
}

impl Absorbed {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.cited_by.is_empty()
    }
}

/// A resolved publication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub record: PublicationRecord,
    /// Minimum discovery depth (seeds are 0)
    pub depth: u32,
    pub origin: Origin,
    /// Every raw identifier that has resolved to this node
    pub identifiers: BTreeSet<Identifier>,
}

impl GraphNode {
    /// Preferred identifier for display and export.
    ///
    /// Nodes built from title-only records get a synthetic `node:<n>` id.
    pub fn canonical_id(&self) -> Identifier {
        self.identifiers
            .iter()
            .min_by_key(|id| id.rank())
            .cloned()
            .unwrap_or_else(|| Identifier::Alternate {
                scheme: "node".to_string(),
                value: self.id.0.to_string(),
            })
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    pub fn is_seed(&self) -> bool {
        self.origin == Origin::Seed
    }
}

/// Edge in the citation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEdge {
    /// Citing node
    pub citing: NodeId,
    /// Cited node
    pub cited: NodeId,
}

/// Outcome of an edge insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Added,
    Duplicate,
    SelfLoop,
}

/// Read-only view consumed by exporters
pub trait GraphView {
    /// All nodes in insertion order
    fn nodes(&self) -> Vec<&GraphNode>;

    /// All edges as (citing, cited) canonical identifiers
    fn edges(&self) -> Vec<(Identifier, Identifier)>;

    /// Node any of whose identifiers equals `id`
    fn node(&self, id: &Identifier) -> Option<&GraphNode>;
}

/// On-disk form of the graph
#[derive(Serialize, Deserialize)]
struct Snapshot {
    nodes: Vec<GraphNode>,
    edges: Vec<CitationEdge>,
}

/// In-memory citation graph
#[derive(Debug, Default)]
pub struct CitationGraph {
    /// Node arena indexed by NodeId
    nodes: Vec<GraphNode>,

    /// Adjacency list: node -> nodes it cites
    outgoing: HashMap<NodeId, BTreeSet<NodeId>>,

    /// Reverse adjacency: node -> nodes citing it
    incoming: HashMap<NodeId, BTreeSet<NodeId>>,

    edge_count: usize,

    /// Identifier -> owning node
    index: HashMap<Identifier, NodeId>,

    /// Publication year -> nodes, for fuzzy candidate lookup
    by_year: BTreeMap<i32, Vec<NodeId>>,
}

impl CitationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a new node. Identifiers already owned by another node keep
    /// pointing at that node.
    pub fn insert_node(&mut self, record: PublicationRecord, depth: u32, origin: Origin) -> NodeId {
        let id = NodeId(self.nodes.len());
        for identifier in &record.identifiers {
            self.index.entry(identifier.clone()).or_insert(id);
        }
        if let Some(year) = record.year {
            self.by_year.entry(year).or_default().push(id);
        }
        self.nodes.push(GraphNode {
            id,
            identifiers: record.identifiers.clone(),
            record,
            depth,
            origin,
        });
        id
    }

    /// Fold another record of the same work into an existing node; returns
    /// the citation ids the node did not know before
    pub fn merge_into(&mut self, id: NodeId, record: &PublicationRecord, depth: u32, origin: Origin) -> Absorbed {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return Absorbed::default();
        };
        let had_year = node.record.year.is_some();
        let known_references = node.record.references.clone();
        let known_cited_by = node.record.cited_by.clone();
        node.record.absorb(record);
        let absorbed = Absorbed {
            references: added_ids(&known_references, &node.record.references),
            cited_by: added_ids(&known_cited_by, &node.record.cited_by),
        };
        node.depth = node.depth.min(depth);
        if origin == Origin::Seed {
            node.origin = Origin::Seed;
        }
        if !had_year {
            if let Some(year) = node.record.year {
                self.by_year.entry(year).or_default().push(id);
            }
        }
        for identifier in &record.identifiers {
            self.add_alias(id, identifier.clone());
        }
        absorbed
    }

    /// Idempotent upsert by exact identifier match
    pub fn upsert_node(&mut self, record: PublicationRecord, depth: u32, origin: Origin) -> NodeId {
        match self.lookup_any(record.identifiers.iter()) {
            Some(id) => {
                self.merge_into(id, &record, depth, origin);
                id
            }
            None => self.insert_node(record, depth, origin),
        }
    }

    /// Record that `identifier` resolves to `id`
    pub fn add_alias(&mut self, id: NodeId, identifier: Identifier) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.identifiers.insert(identifier.clone());
            self.index.entry(identifier).or_insert(id);
        }
    }

    /// Lower a node's depth; returns whether it changed
    pub fn relax_depth(&mut self, id: NodeId, depth: u32) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(node) if depth < node.depth => {
                node.depth = depth;
                true
            }
            _ => false,
        }
    }

    /// Add an edge to the graph
    pub fn add_edge(&mut self, citing: NodeId, cited: NodeId) -> EdgeInsert {
        debug_assert!(citing.0 < self.nodes.len() && cited.0 < self.nodes.len());
        if citing == cited {
            return EdgeInsert::SelfLoop;
        }
        if !self.outgoing.entry(citing).or_default().insert(cited) {
            return EdgeInsert::Duplicate;
        }
        self.incoming.entry(cited).or_default().insert(citing);
        self.edge_count += 1;
        EdgeInsert::Added
    }

    pub fn has_edge(&self, citing: NodeId, cited: NodeId) -> bool {
        self.outgoing
            .get(&citing)
            .map(|targets| targets.contains(&cited))
            .unwrap_or(false)
    }

    /// Node owning an identifier
    pub fn lookup(&self, identifier: &Identifier) -> Option<NodeId> {
        self.index.get(identifier).copied()
    }

    /// Lowest node owning any of the identifiers
    pub fn lookup_any<'a>(&self, identifiers: impl IntoIterator<Item = &'a Identifier>) -> Option<NodeId> {
        identifiers.into_iter().filter_map(|id| self.lookup(id)).min()
    }

    pub fn get(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    /// Nodes whose year lies within `tolerance` of `year`
    pub fn year_candidates(&self, year: i32, tolerance: i32) -> impl Iterator<Item = NodeId> + '_ {
        let tolerance = tolerance.max(0);
        self.by_year
            .range(year.saturating_sub(tolerance)..=year.saturating_add(tolerance))
            .flat_map(|(_, ids)| ids.iter().copied())
    }

    /// Get papers cited by this paper
    pub fn get_references(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing.get(&id).into_iter().flatten().copied()
    }

    /// Get papers citing this paper
    pub fn get_citations(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming.get(&id).into_iter().flatten().copied()
    }

    /// Get citation count (incoming edges)
    pub fn citation_count(&self, id: NodeId) -> usize {
        self.incoming.get(&id).map(|v| v.len()).unwrap_or(0)
    }

    /// Get reference count (outgoing edges)
    pub fn reference_count(&self, id: NodeId) -> usize {
        self.outgoing.get(&id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn seed_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_seed()).count()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// All edges by node id, grouped by citing node
    pub fn edge_list(&self) -> Vec<CitationEdge> {
        let mut edges: Vec<CitationEdge> = self
            .outgoing
            .iter()
            .flat_map(|(&citing, targets)| targets.iter().map(move |&cited| CitationEdge { citing, cited }))
            .collect();
        edges.sort_by_key(|e| (e.citing, e.cited));
        edges
    }

    /// Breadth-first walk from `start` up to `depth` hops.
    ///
    /// Returns every reached node (excluding `start`) with its hop count.
    pub fn traverse(&self, start: NodeId, depth: usize, direction: TraversalDirection) -> Vec<(NodeId, usize)> {
        let mut visited = HashSet::from([start]);
        let mut result = Vec::new();
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((current, current_depth)) = queue.pop_front() {
            if current != start {
                result.push((current, current_depth));
            }
            if current_depth == depth {
                continue;
            }

            let neighbors: Vec<NodeId> = match direction {
                TraversalDirection::Forward => self.get_references(current).collect(),
                TraversalDirection::Backward => self.get_citations(current).collect(),
                TraversalDirection::Both => self
                    .get_references(current)
                    .chain(self.get_citations(current))
                    .collect(),
            };

            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, current_depth + 1));
                }
            }
        }

        result
    }

    /// Persist nodes and edges as JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            nodes: self.nodes.clone(),
            edges: self.edge_list(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &snapshot)?;
        info!(path = %path.display(), nodes = self.node_count(), edges = self.edge_count, "Saved graph");
        Ok(())
    }

    /// Load a graph written by [`CitationGraph::save_json`], rebuilding the index
    pub fn load_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;

        let mut graph = Self::new();
        for (position, node) in snapshot.nodes.into_iter().enumerate() {
            if node.id.0 != position {
                return Err(AppError::Internal {
                    message: format!("Graph file out of order: node {} at position {}", node.id, position),
                });
            }
            let id = graph.insert_node(node.record, node.depth, node.origin);
            for identifier in node.identifiers {
                graph.add_alias(id, identifier);
            }
        }
        for edge in snapshot.edges {
            if edge.citing.0 >= graph.node_count() || edge.cited.0 >= graph.node_count() {
                return Err(AppError::Internal {
                    message: format!("Edge {} -> {} references a missing node", edge.citing, edge.cited),
                });
            }
            graph.add_edge(edge.citing, edge.cited);
        }
        Ok(graph)
    }
}

impl GraphView for CitationGraph {
    fn nodes(&self) -> Vec<&GraphNode> {
        self.nodes.iter().collect()
    }

    fn edges(&self) -> Vec<(Identifier, Identifier)> {
        self.edge_list()
            .into_iter()
            .map(|e| (self.nodes[e.citing.0].canonical_id(), self.nodes[e.cited.0].canonical_id()))
            .collect()
    }

    fn node(&self, id: &Identifier) -> Option<&GraphNode> {
        self.lookup(id).and_then(|n| self.get(n))
    }
}

/// Direction for graph traversal
#[derive(Debug, Clone, Copy)]
pub enum TraversalDirection {
    /// Follow references (papers cited by this paper)
    Forward,
    /// Follow citations (papers citing this paper)
    Backward,
    /// Both directions
    Both,
}

fn added_ids(before: &Option<BTreeSet<Identifier>>, after: &Option<BTreeSet<Identifier>>) -> BTreeSet<Identifier> {
    match (before, after) {
        (Some(before), Some(after)) => after.difference(before).cloned().collect(),
        (None, Some(after)) => after.clone(),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ids: &[&str], title: &str) -> PublicationRecord {
        PublicationRecord {
            identifiers: ids.iter().filter_map(|s| Identifier::parse(s)).collect(),
            title: title.to_string(),
            authors: vec![],
            year: Some(2020),
            venue: None,
            url: None,
            references: None,
            cited_by: None,
            cited_by_count: None,
        }
    }

    fn graph_of(n: usize) -> (CitationGraph, Vec<NodeId>) {
        let mut graph = CitationGraph::new();
        let ids = (0..n)
            .map(|i| graph.insert_node(record(&[&format!("W{}", i + 1)], "p"), 0, Origin::Seed))
            .collect();
        (graph, ids)
    }

    #[test]
    fn test_graph_construction() {
        let (mut graph, ids) = graph_of(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        // A cites B, B cites C
        assert_eq!(graph.add_edge(a, b), EdgeInsert::Added);
        assert_eq!(graph.add_edge(b, c), EdgeInsert::Added);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.get_references(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(graph.get_citations(b).collect::<Vec<_>>(), vec![a]);
        assert_eq!(graph.get_references(b).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_duplicate_and_self_loop_rejected() {
        let (mut graph, ids) = graph_of(2);
        assert_eq!(graph.add_edge(ids[0], ids[1]), EdgeInsert::Added);
        assert_eq!(graph.add_edge(ids[0], ids[1]), EdgeInsert::Duplicate);
        assert_eq!(graph.add_edge(ids[0], ids[0]), EdgeInsert::SelfLoop);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.citation_count(ids[1]), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut graph = CitationGraph::new();
        let first = graph.upsert_node(record(&["W1", "10.1234/x"], "Paper"), 2, Origin::Discovered);
        let second = graph.upsert_node(record(&["10.1234/x"], "Paper"), 1, Origin::Discovered);
        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.get(first).unwrap().depth, 1);
    }

    #[test]
    fn test_merge_reports_new_citations() {
        fn refs(ids: &[&str]) -> Option<BTreeSet<Identifier>> {
            Some(ids.iter().filter_map(|s| Identifier::parse(s)).collect())
        }
        let mut graph = CitationGraph::new();
        let mut first = record(&["W1"], "Paper");
        first.references = refs(&["W50"]);
        let node = graph.insert_node(first, 1, Origin::Discovered);

        let mut second = record(&["W9"], "Paper");
        second.references = refs(&["W50", "W60"]);
        second.cited_by = refs(&["W70"]);
        let absorbed = graph.merge_into(node, &second, 1, Origin::Discovered);

        assert_eq!(absorbed.references, refs(&["W60"]).unwrap());
        assert_eq!(absorbed.cited_by, refs(&["W70"]).unwrap());
        assert!(graph.merge_into(node, &second, 1, Origin::Discovered).is_empty());
    }

    #[test]
    fn test_index_not_repointed() {
        let mut graph = CitationGraph::new();
        let a = graph.insert_node(record(&["W1"], "a"), 0, Origin::Seed);
        let b = graph.insert_node(record(&["W2"], "b"), 0, Origin::Seed);
        graph.add_alias(b, Identifier::parse("W1").unwrap());
        assert_eq!(graph.lookup(&Identifier::parse("W1").unwrap()), Some(a));
        assert_eq!(graph.lookup_any(&[Identifier::parse("W2").unwrap(), Identifier::parse("W1").unwrap()]), Some(a));
    }

    #[test]
    fn test_traverse_both_directions() {
        let (mut graph, ids) = graph_of(4);
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[2], ids[0]);
        graph.add_edge(ids[1], ids[3]);

        let forward = graph.traverse(ids[0], 1, TraversalDirection::Forward);
        assert_eq!(forward, vec![(ids[1], 1)]);

        let both = graph.traverse(ids[0], 1, TraversalDirection::Both);
        assert_eq!(both.len(), 2);

        let deep = graph.traverse(ids[0], 2, TraversalDirection::Forward);
        assert_eq!(deep, vec![(ids[1], 1), (ids[3], 2)]);
    }

    #[test]
    fn test_view_uses_canonical_ids() {
        let mut graph = CitationGraph::new();
        let a = graph.insert_node(record(&["W1", "10.1234/a"], "a"), 0, Origin::Seed);
        let b = graph.insert_node(record(&["W2"], "b"), 1, Origin::Discovered);
        graph.add_edge(a, b);

        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0.to_string(), "doi:10.1234/a");
        assert_eq!(edges[0].1.to_string(), "W2");
        assert_eq!(graph.node(&Identifier::parse("W1").unwrap()).unwrap().id, a);
    }

    #[test]
    fn test_save_and_load() {
        let (mut graph, ids) = graph_of(3);
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[1], ids[2]);
        graph.add_alias(ids[2], Identifier::parse("pmid:99").unwrap());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        graph.save_json(&path).unwrap();

        let loaded = CitationGraph::load_json(&path).unwrap();
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.edge_count(), 2);
        assert!(loaded.has_edge(ids[1], ids[2]));
        assert_eq!(loaded.lookup(&Identifier::parse("pmid:99").unwrap()), Some(ids[2]));
    }
}
