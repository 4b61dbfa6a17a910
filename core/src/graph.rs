//! The primitive directed labeled property graph.
//!
//! Storage strategy follows the arena pattern noted in the design notes:
//! nodes live in a growable vector addressed by a compact [`NodeHandle`],
//! with a `String -> NodeHandle` index for O(1) id lookup. Edges are kept
//! in a parallel arena addressed by [`EdgeHandle`] and indexed by their own
//! string id, with per-node in/out adjacency lists of edge handles. This
//! replaces the reference implementation's linear edge scans with O(1)
//! lookups for `get_relationship` and friends, while keeping the same
//! externally observable semantics.

use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value};

use crate::errors::{GraphError, GraphResult};

/// Opaque handle to a node in the arena. Stable for the node's lifetime;
/// never reused after the node is removed (a tombstone is left behind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

/// Opaque handle to an edge in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeHandle(u32);

struct NodeRecord {
    id: String,
    attrs: Map<String, Value>,
    out_edges: Vec<EdgeHandle>,
    in_edges: Vec<EdgeHandle>,
}

struct EdgeRecord {
    id: String,
    src: NodeHandle,
    dst: NodeHandle,
    attrs: Map<String, Value>,
}

/// The directed labeled property graph.
///
/// Per the design policy, `GraphStore` permits parallel edges between the
/// same ordered pair (distinguished by edge id) — it is the `QueryEngine`
/// layer above that enforces the specification's per-`(src, dst, type)`
/// uniqueness invariant before delegating to [`GraphStore::add_edge`].
#[derive(Default)]
pub struct GraphStore {
    nodes: Vec<Option<NodeRecord>>,
    edges: Vec<Option<EdgeRecord>>,
    node_index: HashMap<String, NodeHandle>,
    edge_index: HashMap<String, EdgeHandle>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_index.len()
    }

    fn node_rec(&self, h: NodeHandle) -> &NodeRecord {
        self.nodes[h.0 as usize].as_ref().expect("tombstoned node handle")
    }

    fn node_rec_mut(&mut self, h: NodeHandle) -> &mut NodeRecord {
        self.nodes[h.0 as usize].as_mut().expect("tombstoned node handle")
    }

    pub fn handle_of(&self, id: &str) -> Option<NodeHandle> {
        self.node_index.get(id).copied()
    }

    pub fn id_of(&self, h: NodeHandle) -> &str {
        &self.node_rec(h).id
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Insert a new node. Returns [`GraphError::NodeAlreadyExists`] if the
    /// id is already present.
    pub fn add_node(&mut self, id: impl Into<String>, attrs: Map<String, Value>) -> GraphResult<NodeHandle> {
        let id = id.into();
        if self.node_index.contains_key(&id) {
            return Err(GraphError::NodeAlreadyExists(id));
        }
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(Some(NodeRecord {
            id: id.clone(),
            attrs,
            out_edges: Vec::new(),
            in_edges: Vec::new(),
        }));
        self.node_index.insert(id, handle);
        Ok(handle)
    }

    pub fn node_attrs(&self, id: &str) -> GraphResult<&Map<String, Value>> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(&self.node_rec(h).attrs)
    }

    pub fn node_attrs_mut(&mut self, id: &str) -> GraphResult<&mut Map<String, Value>> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(&mut self.node_rec_mut(h).attrs)
    }

    /// Remove a node along with every edge incident to it, returning the
    /// number of edges removed.
    pub fn remove_node(&mut self, id: &str) -> GraphResult<usize> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        let incident: Vec<EdgeHandle> = {
            let rec = self.node_rec(h);
            rec.out_edges.iter().chain(rec.in_edges.iter()).copied().collect()
        };
        let removed = incident.len();
        for e in incident {
            self.remove_edge_by_handle(e);
        }
        self.node_index.remove(id);
        self.nodes[h.0 as usize] = None;
        Ok(removed)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Map<String, Value>)> {
        self.nodes.iter().filter_map(|n| n.as_ref()).map(|n| (n.id.as_str(), &n.attrs))
    }

    pub fn node_handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| NodeHandle(i as u32)))
    }

    pub fn in_degree(&self, id: &str) -> GraphResult<usize> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(self.node_rec(h).in_edges.len())
    }

    pub fn out_degree(&self, id: &str) -> GraphResult<usize> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(self.node_rec(h).out_edges.len())
    }

    pub fn degree(&self, id: &str) -> GraphResult<usize> {
        Ok(self.in_degree(id)? + self.out_degree(id)?)
    }

    /// Add a directed edge. Does not enforce per-type uniqueness — the
    /// caller (`QueryEngine`) is responsible for that finer-grained check.
    pub fn add_edge(
        &mut self,
        edge_id: impl Into<String>,
        src: &str,
        dst: &str,
        attrs: Map<String, Value>,
    ) -> GraphResult<EdgeHandle> {
        let edge_id = edge_id.into();
        let src_h = self.handle_of(src).ok_or_else(|| GraphError::NodeNotFound(src.to_string()))?;
        let dst_h = self.handle_of(dst).ok_or_else(|| GraphError::NodeNotFound(dst.to_string()))?;
        let handle = EdgeHandle(self.edges.len() as u32);
        self.edges.push(Some(EdgeRecord {
            id: edge_id.clone(),
            src: src_h,
            dst: dst_h,
            attrs,
        }));
        self.node_rec_mut(src_h).out_edges.push(handle);
        self.node_rec_mut(dst_h).in_edges.push(handle);
        self.edge_index.insert(edge_id, handle);
        Ok(handle)
    }

    pub fn has_edge(&self, src: &str, dst: &str) -> bool {
        let (Some(src_h), Some(dst_h)) = (self.handle_of(src), self.handle_of(dst)) else {
            return false;
        };
        self.node_rec(src_h).out_edges.iter().any(|e| self.edge_rec(*e).dst == dst_h)
    }

    fn edge_rec(&self, h: EdgeHandle) -> &EdgeRecord {
        self.edges[h.0 as usize].as_ref().expect("tombstoned edge handle")
    }

    pub fn edge_by_id(&self, edge_id: &str) -> Option<(&str, &str, &Map<String, Value>)> {
        let h = *self.edge_index.get(edge_id)?;
        let rec = self.edge_rec(h);
        Some((self.id_of(rec.src), self.id_of(rec.dst), &rec.attrs))
    }

    pub fn edge_attrs_mut(&mut self, edge_id: &str) -> Option<&mut Map<String, Value>> {
        let h = *self.edge_index.get(edge_id)?;
        Some(&mut self.edges[h.0 as usize].as_mut().expect("tombstoned edge handle").attrs)
    }

    pub fn remove_edge_by_id(&mut self, edge_id: &str) -> GraphResult<()> {
        let h = *self
            .edge_index
            .get(edge_id)
            .ok_or_else(|| GraphError::EdgeNotFound(edge_id.to_string()))?;
        self.remove_edge_by_handle(h);
        Ok(())
    }

    fn remove_edge_by_handle(&mut self, h: EdgeHandle) {
        let (src, dst, id) = {
            let rec = self.edge_rec(h);
            (rec.src, rec.dst, rec.id.clone())
        };
        self.node_rec_mut(src).out_edges.retain(|e| *e != h);
        self.node_rec_mut(dst).in_edges.retain(|e| *e != h);
        self.edge_index.remove(&id);
        self.edges[h.0 as usize] = None;
    }

    /// Out-edges of a node as `(edge_id, dst_id, attrs)` triples.
    pub fn out_edges(&self, id: &str) -> GraphResult<Vec<(&str, &str, &Map<String, Value>)>> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(self
            .node_rec(h)
            .out_edges
            .iter()
            .map(|e| {
                let rec = self.edge_rec(*e);
                (rec.id.as_str(), self.id_of(rec.dst), &rec.attrs)
            })
            .collect())
    }

    /// In-edges of a node as `(edge_id, src_id, attrs)` triples.
    pub fn in_edges(&self, id: &str) -> GraphResult<Vec<(&str, &str, &Map<String, Value>)>> {
        let h = self.handle_of(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(self
            .node_rec(h)
            .in_edges
            .iter()
            .map(|e| {
                let rec = self.edge_rec(*e);
                (rec.id.as_str(), self.id_of(rec.src), &rec.attrs)
            })
            .collect())
    }

    pub fn all_edges(&self) -> impl Iterator<Item = (&str, &str, &str, &Map<String, Value>)> {
        self.edges.iter().filter_map(|e| e.as_ref()).map(|e| {
            (e.id.as_str(), self.id_of(e.src), self.id_of(e.dst), &e.attrs)
        })
    }

    /// Unweighted shortest-path length following directed out-edges only.
    pub fn shortest_path_length(&self, src: &str, dst: &str) -> GraphResult<usize> {
        if src == dst {
            return Ok(0);
        }
        let src_h = self.handle_of(src).ok_or_else(|| GraphError::NodeNotFound(src.to_string()))?;
        let dst_h = self.handle_of(dst).ok_or_else(|| GraphError::NodeNotFound(dst.to_string()))?;

        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        visited[src_h.0 as usize] = true;
        queue.push_back((src_h, 0usize));

        while let Some((cur, dist)) = queue.pop_front() {
            if cur == dst_h {
                return Ok(dist);
            }
            for e in &self.node_rec(cur).out_edges {
                let next = self.edge_rec(*e).dst;
                if !visited[next.0 as usize] {
                    visited[next.0 as usize] = true;
                    queue.push_back((next, dist + 1));
                }
            }
        }
        Err(GraphError::NoPath {
            from: src.to_string(),
            to: dst.to_string(),
        })
    }

    /// BFS distances from `src` to every reachable node, following directed
    /// out-edges only. Does not include `src` itself.
    pub fn bfs_distances(&self, src: &str) -> GraphResult<HashMap<String, usize>> {
        let src_h = self.handle_of(src).ok_or_else(|| GraphError::NodeNotFound(src.to_string()))?;
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        let mut distances = HashMap::new();
        visited[src_h.0 as usize] = true;
        queue.push_back((src_h, 0usize));

        while let Some((cur, dist)) = queue.pop_front() {
            for e in &self.node_rec(cur).out_edges {
                let next = self.edge_rec(*e).dst;
                if !visited[next.0 as usize] {
                    visited[next.0 as usize] = true;
                    distances.insert(self.id_of(next).to_string(), dist + 1);
                    queue.push_back((next, dist + 1));
                }
            }
        }
        Ok(distances)
    }

    /// All simple directed paths from `src` to `dst` with at most `cutoff`
    /// edges (i.e. at most `cutoff + 1` nodes), depth-first with a
    /// visited-set to guarantee simplicity.
    pub fn all_simple_paths(&self, src: &str, dst: &str, cutoff: usize) -> GraphResult<Vec<Vec<NodeHandle>>> {
        let src_h = self.handle_of(src).ok_or_else(|| GraphError::NodeNotFound(src.to_string()))?;
        let dst_h = self.handle_of(dst).ok_or_else(|| GraphError::NodeNotFound(dst.to_string()))?;

        let mut results = Vec::new();
        let mut visiting = vec![false; self.nodes.len()];
        let mut path = vec![src_h];
        visiting[src_h.0 as usize] = true;

        self.dfs_paths(src_h, dst_h, cutoff, &mut visiting, &mut path, &mut results);
        Ok(results)
    }

    fn dfs_paths(
        &self,
        cur: NodeHandle,
        dst: NodeHandle,
        cutoff: usize,
        visiting: &mut [bool],
        path: &mut Vec<NodeHandle>,
        results: &mut Vec<Vec<NodeHandle>>,
    ) {
        if path.len() > cutoff + 1 {
            return;
        }
        if cur == dst && path.len() > 1 {
            results.push(path.clone());
            return;
        }
        if path.len() == cutoff + 1 {
            return;
        }
        for e in &self.node_rec(cur).out_edges {
            let next = self.edge_rec(*e).dst;
            if !visiting[next.0 as usize] {
                visiting[next.0 as usize] = true;
                path.push(next);
                self.dfs_paths(next, dst, cutoff, visiting, path, results);
                path.pop();
                visiting[next.0 as usize] = false;
            }
        }
    }

    /// Undirected adjacency, collapsing both edge directions into a single
    /// neighbor set per node. Used by community/connected-components
    /// analysis only; the primary graph remains directed.
    pub fn undirected_adjacency(&self) -> HashMap<NodeHandle, Vec<NodeHandle>> {
        let mut adj: HashMap<NodeHandle, Vec<NodeHandle>> = HashMap::new();
        for h in self.node_handles() {
            adj.entry(h).or_default();
        }
        for e in self.edges.iter().filter_map(|e| e.as_ref()) {
            adj.entry(e.src).or_default().push(e.dst);
            adj.entry(e.dst).or_default().push(e.src);
        }
        adj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> Map<String, Value> {
        Map::new()
    }

    #[test]
    fn add_and_lookup_node() {
        let mut g = GraphStore::new();
        g.add_node("a", attrs()).unwrap();
        assert!(g.has_node("a"));
        assert_eq!(g.node_count(), 1);
        assert!(matches!(g.add_node("a", attrs()), Err(GraphError::NodeAlreadyExists(_))));
    }

    #[test]
    fn edges_and_degree() {
        let mut g = GraphStore::new();
        g.add_node("a", attrs()).unwrap();
        g.add_node("b", attrs()).unwrap();
        g.add_edge("e1", "a", "b", attrs()).unwrap();
        assert_eq!(g.out_degree("a").unwrap(), 1);
        assert_eq!(g.in_degree("b").unwrap(), 1);
        assert!(g.has_edge("a", "b"));
        assert!(!g.has_edge("b", "a"));
    }

    #[test]
    fn remove_node_cascades_edges() {
        let mut g = GraphStore::new();
        g.add_node("a", attrs()).unwrap();
        g.add_node("b", attrs()).unwrap();
        g.add_edge("e1", "a", "b", attrs()).unwrap();
        let removed = g.remove_node("a").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(g.in_degree("b").unwrap(), 0);
        assert!(g.edge_by_id("e1").is_none());
    }

    #[test]
    fn shortest_path_and_simple_paths() {
        let mut g = GraphStore::new();
        for n in ["a", "b", "c", "d"] {
            g.add_node(n, attrs()).unwrap();
        }
        g.add_edge("e1", "a", "b", attrs()).unwrap();
        g.add_edge("e2", "a", "c", attrs()).unwrap();
        g.add_edge("e3", "b", "d", attrs()).unwrap();
        g.add_edge("e4", "c", "d", attrs()).unwrap();

        assert_eq!(g.shortest_path_length("a", "d").unwrap(), 2);
        let paths = g.all_simple_paths("a", "d", 3).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn no_path_is_an_error() {
        let mut g = GraphStore::new();
        g.add_node("a", attrs()).unwrap();
        g.add_node("b", attrs()).unwrap();
        assert!(matches!(
            g.shortest_path_length("a", "b"),
            Err(GraphError::NoPath { .. })
        ));
    }
}
