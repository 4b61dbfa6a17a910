//! The query engine: the single mutable owner of a [`GraphStore`] plus its
//! companion [`StructuredOntology`], and the home of every read and
//! mutation operation the rest of the system calls through.
//!
//! Node and edge attribute maps double as the entity/relationship record:
//! `label`, `type`/`label`, `created_at`, `updated_at` live as plain keys
//! inside the same `Map<String, Value>` that `GraphStore` already carries,
//! with everything else passing through untouched. [`Entity`]/[`Relationship`]
//! are reconstructed from that map on read, never stored separately — this
//! mirrors the reference implementation's node-attribute-dict graph and
//! keeps persistence a straight round-trip instead of a join.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::errors::{QueryError, QueryResult};
use crate::graph::{GraphStore, NodeHandle};
use crate::outline::{StructuredOntology, TopicHit};
use crate::persistence::{KnowledgeGraphDocument, PersistenceDocument};
use crate::types::{
    render_timestamp, CentralEntity, EdgeRef, Entity, NeighborRef, PathStep, RelatedConcept,
    Relationship, SearchHit, RESERVED_ENTITY_KEYS, RESERVED_RELATIONSHIP_KEYS,
};

/// The in-memory ontology engine: a graph, an outline, and (optionally)
/// the path it was loaded from for `save_changes`.
pub struct QueryEngine {
    graph: GraphStore,
    outline: StructuredOntology,
    source_path: Option<PathBuf>,
    /// Top-level document keys this engine didn't model, carried verbatim
    /// so a load→save round trip doesn't lose them.
    document_extra: Map<String, Value>,
    /// `knowledge_graph.graph` metadata object and its `directed`/
    /// `multigraph` flags and unknown sibling keys, carried verbatim.
    kg_directed: bool,
    kg_multigraph: bool,
    kg_graph: Value,
    kg_extra: Map<String, Value>,
}

impl QueryEngine {
    pub fn empty() -> Self {
        Self {
            graph: GraphStore::new(),
            outline: StructuredOntology::default(),
            source_path: None,
            document_extra: Map::new(),
            kg_directed: true,
            kg_multigraph: false,
            kg_graph: Value::Object(Map::new()),
            kg_extra: Map::new(),
        }
    }

    pub fn from_document(doc: PersistenceDocument) -> QueryResult<Self> {
        let mut graph = GraphStore::new();
        for mut obj in doc.knowledge_graph.nodes {
            let id = take_string(&mut obj, "id")
                .ok_or_else(|| QueryError::Validation("node is missing an 'id' field".into()))?;
            graph.add_node(id, obj)?;
        }
        for mut obj in doc.knowledge_graph.edges {
            let source = take_string(&mut obj, "source")
                .ok_or_else(|| QueryError::Validation("edge is missing a 'source' field".into()))?;
            let target = take_string(&mut obj, "target")
                .ok_or_else(|| QueryError::Validation("edge is missing a 'target' field".into()))?;
            let id = take_string(&mut obj, "id").unwrap_or_else(|| format!("{source}_{target}"));
            graph.add_edge(id, &source, &target, obj)?;
        }
        Ok(Self {
            graph,
            outline: doc.structured_ontology,
            source_path: None,
            document_extra: doc.extra,
            kg_directed: doc.knowledge_graph.directed,
            kg_multigraph: doc.knowledge_graph.multigraph,
            kg_graph: doc.knowledge_graph.graph,
            kg_extra: doc.knowledge_graph.extra,
        })
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> QueryResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let doc = PersistenceDocument::from_str(&raw)?;
        let mut engine = Self::from_document(doc)?;
        engine.source_path = Some(path.as_ref().to_path_buf());
        Ok(engine)
    }

    /// Persist back to the path this engine was loaded from, atomically
    /// (write to a sibling temp file, then rename over the target).
    pub fn save_changes(&self) -> QueryResult<bool> {
        let path = self
            .source_path
            .as_ref()
            .ok_or_else(|| QueryError::Validation("engine has no source path to save to".into()))?;
        self.save_to_path(path)?;
        Ok(true)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> QueryResult<()> {
        let path = path.as_ref();
        let raw = self.to_document().to_pretty_string()?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn to_document(&self) -> PersistenceDocument {
        let nodes = self
            .graph
            .nodes()
            .map(|(id, attrs)| {
                let mut obj = attrs.clone();
                obj.insert("id".into(), Value::String(id.to_string()));
                obj
            })
            .collect();
        let edges = self
            .graph
            .all_edges()
            .map(|(id, src, dst, attrs)| {
                let mut obj = attrs.clone();
                obj.insert("id".into(), Value::String(id.to_string()));
                obj.insert("source".into(), Value::String(src.to_string()));
                obj.insert("target".into(), Value::String(dst.to_string()));
                obj
            })
            .collect();
        PersistenceDocument {
            structured_ontology: self.outline.clone(),
            knowledge_graph: KnowledgeGraphDocument {
                directed: self.kg_directed,
                multigraph: self.kg_multigraph,
                graph: self.kg_graph.clone(),
                nodes,
                edges,
                extra: self.kg_extra.clone(),
            },
            extra: self.document_extra.clone(),
        }
    }

    // ---- reads -------------------------------------------------------

    pub fn query_entity(&self, id: &str) -> QueryResult<Value> {
        let attrs = self
            .graph
            .node_attrs(id)
            .map_err(|_| QueryError::NotFound(format!("Entity '{id}' not found")))?;
        let entity = entity_from_attrs(id, attrs);

        let outgoing: Vec<EdgeRef> = self
            .graph
            .out_edges(id)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, dst, eattrs)| EdgeRef {
                id: dst.to_string(),
                label: self.node_label(dst),
                relationship: eattrs
                    .get("label")
                    .and_then(|v| v.as_str())
                    .unwrap_or("connected to")
                    .to_string(),
            })
            .collect();
        let incoming: Vec<EdgeRef> = self
            .graph
            .in_edges(id)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, src, eattrs)| EdgeRef {
                id: src.to_string(),
                label: self.node_label(src),
                relationship: eattrs
                    .get("label")
                    .and_then(|v| v.as_str())
                    .unwrap_or("connected to")
                    .to_string(),
            })
            .collect();

        Ok(json!({
            "id": entity.id,
            "attributes": entity.to_attributes_value(),
            "incoming": incoming,
            "outgoing": outgoing,
        }))
    }

    fn node_label(&self, id: &str) -> String {
        self.graph
            .node_attrs(id)
            .ok()
            .and_then(|a| a.get("label"))
            .and_then(|v| v.as_str())
            .unwrap_or(id)
            .to_string()
    }

    fn node_type(&self, id: &str) -> String {
        self.graph
            .node_attrs(id)
            .ok()
            .and_then(|a| a.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Case-insensitive substring match against `label`; exact (lowercased)
    /// hits score 1.0, partial hits 0.5. `entity_types`, when given, excludes
    /// any node whose `type` is not in the list.
    pub fn search_entities(&self, query: &str, entity_types: Option<&[String]>) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        self.graph
            .nodes()
            .filter_map(|(id, attrs)| {
                let label = attrs.get("label").and_then(|v| v.as_str()).unwrap_or(id);
                let label_lower = label.to_lowercase();
                let node_type = attrs.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
                if let Some(types) = entity_types {
                    if !types.iter().any(|t| t == node_type) {
                        return None;
                    }
                }
                if !label_lower.contains(&needle) {
                    return None;
                }
                let score = if label_lower == needle { 1.0 } else { 0.5 };
                Some(SearchHit {
                    id: id.to_string(),
                    label: label.to_string(),
                    entity_type: node_type.to_string(),
                    score,
                })
            })
            .collect::<Vec<_>>()
            .tap_sort_by_score()
    }

    pub fn find_paths(&self, source_id: &str, target_id: &str, max_length: usize) -> Vec<Vec<PathStep>> {
        if !self.graph.has_node(source_id) || !self.graph.has_node(target_id) {
            return Vec::new();
        }
        let Ok(node_paths) = self.graph.all_simple_paths(source_id, target_id, max_length) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(node_paths.len());
        for node_path in node_paths {
            let mut steps = Vec::with_capacity(node_path.len());
            for (i, handle) in node_path.iter().enumerate() {
                let id = self.graph.id_of(*handle);
                let relationship_to_next = if i + 1 < node_path.len() {
                    let next_id = self.graph.id_of(node_path[i + 1]);
                    self.graph
                        .out_edges(id)
                        .unwrap_or_default()
                        .into_iter()
                        .find(|(_, dst, _)| *dst == next_id)
                        .and_then(|(_, _, a)| a.get("label").and_then(|v| v.as_str()))
                        .or(Some("connected to"))
                        .map(String::from)
                } else {
                    None
                };
                steps.push(PathStep {
                    id: id.to_string(),
                    label: self.node_label(id),
                    entity_type: self.node_type(id),
                    relationship_to_next,
                });
            }
            out.push(steps);
        }
        out
    }

    /// Mapping from distance `d` (1..=max_distance) to the nodes whose
    /// shortest directed-path distance from `entity_id` equals `d`; distances
    /// with no node are omitted entirely.
    pub fn find_connections(&self, entity_id: &str, max_distance: usize) -> QueryResult<BTreeMap<usize, Vec<NeighborRef>>> {
        if !self.graph.has_node(entity_id) {
            return Err(QueryError::NotFound(format!("Entity '{entity_id}' not found")));
        }
        let mut shells: BTreeMap<usize, Vec<NeighborRef>> = BTreeMap::new();
        for (id, distance) in self.graph.bfs_distances(entity_id)? {
            if distance >= 1 && distance <= max_distance {
                shells.entry(distance).or_default().push(NeighborRef {
                    label: self.node_label(&id),
                    entity_type: self.node_type(&id),
                    id,
                });
            }
        }
        Ok(shells)
    }

    /// Top-`limit` entities by total-degree centrality (`degree / (N-1)`);
    /// ties keep the graph's node-insertion order (a stable sort, no
    /// secondary key).
    pub fn get_central_entities(&self, limit: usize, entity_type: Option<&str>) -> QueryResult<Vec<CentralEntity>> {
        let denom = (self.graph.node_count() as f64 - 1.0).max(1.0);
        let mut out = Vec::new();
        for (id, attrs) in self.graph.nodes() {
            let et = attrs.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
            if let Some(filter) = entity_type {
                if et != filter {
                    continue;
                }
            }
            let connections = self.graph.degree(id)?;
            out.push(CentralEntity {
                id: id.to_string(),
                label: attrs.get("label").and_then(|v| v.as_str()).unwrap_or(id).to_string(),
                entity_type: et.to_string(),
                centrality: connections as f64 / denom,
                connections,
            });
        }
        out.sort_by(|a, b| b.connections.cmp(&a.connections));
        out.truncate(limit);
        Ok(out)
    }

    /// Grouped by relationship type: outgoing edges appear under the raw
    /// type, incoming edges under `"inverse_" + type`. A `relationship_type`
    /// filter, when given, matches the raw (non-inverse) type on both sides.
    pub fn get_related_concepts(
        &self,
        entity_id: &str,
        relationship_type: Option<&str>,
    ) -> QueryResult<BTreeMap<String, Vec<RelatedConcept>>> {
        if !self.graph.has_node(entity_id) {
            return Err(QueryError::NotFound(format!("Entity '{entity_id}' not found")));
        }
        let mut grouped: BTreeMap<String, Vec<RelatedConcept>> = BTreeMap::new();
        for (_, dst, attrs) in self.graph.out_edges(entity_id)? {
            let rel = attrs.get("label").and_then(|v| v.as_str()).unwrap_or("").to_string();
            if relationship_type.is_some_and(|f| f != rel) {
                continue;
            }
            grouped.entry(rel).or_default().push(RelatedConcept {
                id: dst.to_string(),
                label: self.node_label(dst),
                entity_type: self.node_type(dst),
                direction: "outgoing".into(),
            });
        }
        for (_, src, attrs) in self.graph.in_edges(entity_id)? {
            let rel = attrs.get("label").and_then(|v| v.as_str()).unwrap_or("").to_string();
            if relationship_type.is_some_and(|f| f != rel) {
                continue;
            }
            grouped.entry(format!("inverse_{rel}")).or_default().push(RelatedConcept {
                id: src.to_string(),
                label: self.node_label(src),
                entity_type: self.node_type(src),
                direction: "incoming".into(),
            });
        }
        Ok(grouped)
    }

    pub fn get_entity_types(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, attrs) in self.graph.nodes() {
            let t = attrs.get("type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *counts.entry(t).or_insert(0) += 1;
        }
        counts
    }

    pub fn get_relationship_types(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, _, _, attrs) in self.graph.all_edges() {
            let t = attrs.get("label").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *counts.entry(t).or_insert(0) += 1;
        }
        counts
    }

    /// Root nodes are those with no incoming edge *and* at least one
    /// outgoing edge; depth is unweighted BFS distance from a root following
    /// directed out-edges.
    pub fn analyze_concept_hierarchy(&self) -> QueryResult<Value> {
        let roots: Vec<&str> = self
            .graph
            .nodes()
            .map(|(id, _)| id)
            .filter(|id| self.graph.in_degree(id).unwrap_or(0) == 0 && self.graph.out_degree(id).unwrap_or(0) > 0)
            .collect();

        let mut root_nodes = Vec::with_capacity(roots.len());
        let mut hierarchies = Map::new();
        for root_id in &roots {
            let (levels, max_depth) = self.hierarchy_levels(root_id)?;
            root_nodes.push(json!({
                "id": root_id,
                "label": self.node_label(root_id),
                "type": self.node_type(root_id),
                "max_depth": max_depth,
            }));
            hierarchies.insert((*root_id).to_string(), Value::Object(levels));
        }
        Ok(json!({
            "root_nodes": root_nodes,
            "hierarchies": hierarchies,
        }))
    }

    fn hierarchy_levels(&self, root_id: &str) -> QueryResult<(Map<String, Value>, usize)> {
        let mut levels: BTreeMap<usize, Vec<NeighborRef>> = BTreeMap::new();
        levels.entry(0).or_default().push(NeighborRef {
            id: root_id.to_string(),
            label: self.node_label(root_id),
            entity_type: self.node_type(root_id),
        });
        let mut max_depth = 0usize;
        for (id, dist) in self.graph.bfs_distances(root_id)? {
            max_depth = max_depth.max(dist);
            levels.entry(dist).or_default().push(NeighborRef {
                label: self.node_label(&id),
                entity_type: self.node_type(&id),
                id,
            });
        }
        let mut out = Map::new();
        for (depth, nodes) in levels {
            out.insert(depth.to_string(), serde_json::to_value(nodes)?);
        }
        Ok((out, max_depth))
    }

    /// Chains built by following edges whose label contains the substring
    /// `"evolved"`. Every edge is scanned in insertion order; the first time
    /// an unvisited source with such an outgoing edge is found, a chain is
    /// traced by repeatedly following the first matching outgoing edge until
    /// none remains, marking every node along the way visited.
    pub fn get_concept_evolution(&self) -> Vec<Vec<NeighborRef>> {
        let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut chains = Vec::new();

        for (_, src, _, attrs) in self.graph.all_edges() {
            let label = attrs.get("label").and_then(|v| v.as_str()).unwrap_or("");
            if !label.to_lowercase().contains("evolved") {
                continue;
            }
            if visited.contains(src) {
                continue;
            }

            let mut chain = vec![src.to_string()];
            visited.insert(src.to_string());
            let mut current = src.to_string();
            loop {
                let next = self
                    .graph
                    .out_edges(&current)
                    .unwrap_or_default()
                    .into_iter()
                    .find(|(_, _, a)| {
                        a.get("label")
                            .and_then(|v| v.as_str())
                            .is_some_and(|l| l.to_lowercase().contains("evolved"))
                    })
                    .map(|(_, dst, _)| dst.to_string());
                match next {
                    Some(n) if !visited.contains(&n) => {
                        visited.insert(n.clone());
                        chain.push(n.clone());
                        current = n;
                    }
                    _ => break,
                }
            }
            chains.push(
                chain
                    .iter()
                    .map(|id| NeighborRef {
                        label: self.node_label(id),
                        entity_type: self.node_type(id),
                        id: id.clone(),
                    })
                    .collect(),
            );
        }
        chains
    }

    /// A single greedy modularity-gain pass (level one of a Louvain-style
    /// optimization) over the undirected projection; falls back to raw
    /// connected components for graphs too sparse for modularity to mean
    /// anything (fewer than 2 edges).
    pub fn find_communities(&self) -> BTreeMap<String, Vec<String>> {
        let adj = self.graph.undirected_adjacency();
        let handles: Vec<NodeHandle> = adj.keys().copied().collect();
        let edge_count = self.graph.edge_count();

        let mut community: HashMap<NodeHandle, usize> = handles.iter().enumerate().map(|(i, h)| (*h, i)).collect();

        if handles.len() >= 2 && edge_count >= 2 {
            let degree = |h: NodeHandle| adj.get(&h).map(|v| v.len()).unwrap_or(0) as f64;
            let two_m = edge_count as f64 * 2.0;

            let mut improved = true;
            let mut pass = 0;
            while improved && pass < 10 {
                improved = false;
                pass += 1;
                for &h in &handles {
                    let current = community[&h];
                    let mut links_to: HashMap<usize, usize> = HashMap::new();
                    for &neighbor in &adj[&h] {
                        *links_to.entry(community[&neighbor]).or_insert(0) += 1;
                    }
                    let k_i = degree(h);
                    let mut best_comm = current;
                    let mut best_gain = 0.0f64;
                    for (&comm, &links) in &links_to {
                        if comm == current {
                            continue;
                        }
                        let sigma_tot: f64 = handles.iter().filter(|x| community[x] == comm).map(|&x| degree(x)).sum();
                        let gain = links as f64 - k_i * sigma_tot / two_m;
                        if gain > best_gain {
                            best_gain = gain;
                            best_comm = comm;
                        }
                    }
                    if best_comm != current {
                        community.insert(h, best_comm);
                        improved = true;
                    }
                }
            }
        }

        let mut by_comm: HashMap<usize, Vec<String>> = HashMap::new();
        for &h in &handles {
            by_comm.entry(community[&h]).or_default().push(self.graph.id_of(h).to_string());
        }
        let mut labeled = BTreeMap::new();
        for (i, (_, mut ids)) in by_comm.into_iter().enumerate() {
            ids.sort();
            labeled.insert(i.to_string(), ids);
        }
        labeled
    }

    pub fn generate_ontology_summary(&self) -> Value {
        json!({
            "node_count": self.graph.node_count(),
            "edge_count": self.graph.edge_count(),
            "entity_types": self.get_entity_types(),
            "relationship_types": self.get_relationship_types(),
            "central_entities": self.get_central_entities(5, None).unwrap_or_default(),
            "sections": self.outline.0.len(),
            "subsections": self.outline.0.values().map(|s| s.subsections.len()).sum::<usize>(),
        })
    }

    pub fn find_section_by_topic(&self, topic: &str) -> Vec<TopicHit> {
        self.outline.find_section_by_topic(topic)
    }

    pub fn get_subsection_content(&self, section_num: i64, subsection_name: &str) -> Option<&Vec<String>> {
        self.outline.get_subsection_content(section_num, subsection_name)
    }

    pub fn structured_ontology(&self) -> &StructuredOntology {
        &self.outline
    }

    /// `query`, when given, matches `label` or `description` (case-insensitive
    /// substring). `sort` is whitelisted to `label`/`type`/`created_at`,
    /// defaulting to `id` otherwise. Returns `{items, total}` where each item
    /// is the fixed projection `{id,label,type,description,created_at}`
    /// (matching the reference implementation, not the full attribute map).
    pub fn list_entities(
        &self,
        entity_type: Option<&str>,
        query: Option<&str>,
        limit: usize,
        offset: usize,
        sort: &str,
        order: &str,
    ) -> Value {
        let needle = query.map(|q| q.to_lowercase());
        let mut items: Vec<Entity> = self
            .graph
            .nodes()
            .filter(|(_, attrs)| {
                if entity_type.is_some_and(|t| attrs.get("type").and_then(|v| v.as_str()) != Some(t)) {
                    return false;
                }
                if let Some(needle) = &needle {
                    let label = attrs.get("label").and_then(|v| v.as_str()).unwrap_or("").to_lowercase();
                    let description = attrs
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_lowercase();
                    if !label.contains(needle.as_str()) && !description.contains(needle.as_str()) {
                        return false;
                    }
                }
                true
            })
            .map(|(id, attrs)| entity_from_attrs(id, attrs))
            .collect();

        match sort {
            "label" => items.sort_by(|a, b| a.label.cmp(&b.label)),
            "type" => items.sort_by(|a, b| a.entity_type.cmp(&b.entity_type)),
            "created_at" => items.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            _ => items.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        if order.eq_ignore_ascii_case("desc") {
            items.reverse();
        }

        let total = items.len();
        let paged: Vec<Value> = items
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| {
                json!({
                    "id": e.id,
                    "label": e.label,
                    "type": e.entity_type,
                    "description": e.description,
                    "created_at": e.created_at.map(render_timestamp),
                })
            })
            .collect();
        json!({ "items": paged, "total": total })
    }

    /// `entity_id`, when given, matches either `source_id` or `target_id`.
    /// `sort` is whitelisted to `relationship_type`/`source_label`/
    /// `target_label`/`created_at`, defaulting to `id` otherwise. Each item
    /// is `{id,source_id,source_label,target_id,target_label,relationship_type,created_at}`.
    #[allow(clippy::too_many_arguments)]
    pub fn list_relationships(
        &self,
        source_id: Option<&str>,
        target_id: Option<&str>,
        entity_id: Option<&str>,
        relationship_type: Option<&str>,
        limit: usize,
        offset: usize,
        sort: &str,
        order: &str,
    ) -> Value {
        struct Row {
            rel: Relationship,
            source_label: String,
            target_label: String,
        }

        let mut items: Vec<Row> = self
            .graph
            .all_edges()
            .filter(|(_, src, dst, attrs)| {
                if relationship_type.is_some_and(|t| attrs.get("label").and_then(|v| v.as_str()) != Some(t)) {
                    return false;
                }
                if source_id.is_some_and(|s| *src != s) {
                    return false;
                }
                if target_id.is_some_and(|t| *dst != t) {
                    return false;
                }
                if entity_id.is_some_and(|e| *src != e && *dst != e) {
                    return false;
                }
                true
            })
            .map(|(id, src, dst, attrs)| Row {
                source_label: self.node_label(src),
                target_label: self.node_label(dst),
                rel: relationship_from_attrs(id, src, dst, attrs),
            })
            .collect();

        match sort {
            "relationship_type" => items.sort_by(|a, b| a.rel.relationship_type.cmp(&b.rel.relationship_type)),
            "source_label" => items.sort_by(|a, b| a.source_label.cmp(&b.source_label)),
            "target_label" => items.sort_by(|a, b| a.target_label.cmp(&b.target_label)),
            "created_at" => items.sort_by(|a, b| a.rel.created_at.cmp(&b.rel.created_at)),
            _ => items.sort_by(|a, b| a.rel.id.cmp(&b.rel.id)),
        }
        if order.eq_ignore_ascii_case("desc") {
            items.reverse();
        }

        let total = items.len();
        let paged: Vec<Value> = items
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                json!({
                    "id": row.rel.id,
                    "source_id": row.rel.source_id,
                    "source_label": row.source_label,
                    "target_id": row.rel.target_id,
                    "target_label": row.target_label,
                    "relationship_type": row.rel.relationship_type,
                    "created_at": row.rel.created_at.map(render_timestamp),
                })
            })
            .collect();
        json!({ "items": paged, "total": total })
    }

    // ---- mutations -----------------------------------------------------

    /// Creates an entity. When `id` is given explicitly it is used as-is and
    /// rejected with a validation error if it already exists; otherwise an
    /// id is derived from `label` (colliding derived ids get a random
    /// suffix — see [`Self::derive_entity_id`]).
    #[allow(clippy::too_many_arguments)]
    pub fn create_entity(
        &mut self,
        id: Option<&str>,
        label: &str,
        entity_type: &str,
        description: Option<&str>,
        external_url: Option<&str>,
        attributes: Map<String, Value>,
    ) -> QueryResult<Entity> {
        if label.trim().is_empty() {
            return Err(QueryError::Validation("label must not be empty".into()));
        }
        reject_reserved(&attributes, RESERVED_ENTITY_KEYS)?;

        let id = match id {
            Some(id) if self.graph.has_node(id) => {
                return Err(QueryError::Validation(format!("Entity '{id}' already exists")));
            }
            Some(id) => id.to_string(),
            None => self.derive_entity_id(label),
        };
        let mut node_attrs = attributes;
        node_attrs.insert("label".into(), Value::String(label.to_string()));
        node_attrs.insert("type".into(), Value::String(entity_type.to_string()));
        if let Some(d) = description {
            node_attrs.insert("description".into(), Value::String(d.to_string()));
        }
        if let Some(u) = external_url {
            node_attrs.insert("external_url".into(), Value::String(u.to_string()));
        }
        node_attrs.insert("created_at".into(), Value::String(render_timestamp(Utc::now())));
        self.graph.add_node(id.clone(), node_attrs.clone())?;
        Ok(entity_from_attrs(&id, &node_attrs))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_entity(
        &mut self,
        id: &str,
        label: Option<&str>,
        entity_type: Option<&str>,
        description: Option<&str>,
        external_url: Option<&str>,
        attributes: Option<Map<String, Value>>,
    ) -> QueryResult<Entity> {
        if !self.graph.has_node(id) {
            return Err(QueryError::NotFound(format!("Entity '{id}' not found")));
        }
        if let Some(attrs) = &attributes {
            reject_reserved(attrs, RESERVED_ENTITY_KEYS)?;
        }
        let node_attrs = self.graph.node_attrs_mut(id)?;
        if let Some(attrs) = attributes {
            for (k, v) in attrs {
                node_attrs.insert(k, v);
            }
        }
        if let Some(l) = label {
            node_attrs.insert("label".into(), Value::String(l.to_string()));
        }
        if let Some(t) = entity_type {
            node_attrs.insert("type".into(), Value::String(t.to_string()));
        }
        if let Some(d) = description {
            node_attrs.insert("description".into(), Value::String(d.to_string()));
        }
        if let Some(u) = external_url {
            node_attrs.insert("external_url".into(), Value::String(u.to_string()));
        }
        node_attrs.insert("updated_at".into(), Value::String(render_timestamp(Utc::now())));
        Ok(entity_from_attrs(id, node_attrs))
    }

    /// Returns `{success:false, not_found:true}` for a missing id,
    /// `{success:false, message:"..."}` when the entity has incident
    /// relationships and `cascade` is false, and otherwise
    /// `{success:true, relationships_removed:N}`. None of these are raised
    /// as errors — they are all ordinary return values the caller branches on.
    pub fn delete_entity(&mut self, id: &str, cascade: bool) -> QueryResult<Value> {
        if !self.graph.has_node(id) {
            return Ok(json!({ "success": false, "not_found": true }));
        }
        let degree = self.graph.degree(id)?;
        if degree > 0 && !cascade {
            return Ok(json!({
                "success": false,
                "message": "Entity has relationships. Use cascade=true to delete them.",
            }));
        }
        let removed = self.graph.remove_node(id)?;
        Ok(json!({ "success": true, "relationships_removed": removed }))
    }

    pub fn create_relationship(
        &mut self,
        source_id: &str,
        target_id: &str,
        relationship_type: &str,
        attributes: Map<String, Value>,
    ) -> QueryResult<Relationship> {
        if !self.graph.has_node(source_id) {
            return Err(QueryError::NotFound(format!("Entity '{source_id}' not found")));
        }
        if !self.graph.has_node(target_id) {
            return Err(QueryError::NotFound(format!("Entity '{target_id}' not found")));
        }
        if source_id == target_id {
            return Err(QueryError::Validation("a relationship cannot connect an entity to itself".into()));
        }
        reject_reserved(&attributes, RESERVED_RELATIONSHIP_KEYS)?;

        let duplicate = self
            .graph
            .out_edges(source_id)?
            .into_iter()
            .any(|(_, dst, attrs)| dst == target_id && attrs.get("label").and_then(|v| v.as_str()) == Some(relationship_type));
        if duplicate {
            return Err(QueryError::Validation(format!(
                "a '{relationship_type}' relationship from {source_id} to {target_id} already exists"
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut edge_attrs = attributes;
        edge_attrs.insert("label".into(), Value::String(relationship_type.to_string()));
        edge_attrs.insert("created_at".into(), Value::String(render_timestamp(Utc::now())));
        self.graph.add_edge(id.clone(), source_id, target_id, edge_attrs.clone())?;
        Ok(relationship_from_attrs(&id, source_id, target_id, &edge_attrs))
    }

    pub fn get_relationship(&self, id: &str) -> QueryResult<Relationship> {
        let (src, dst, attrs) = self
            .graph
            .edge_by_id(id)
            .ok_or_else(|| QueryError::NotFound(format!("Relationship '{id}' not found")))?;
        Ok(relationship_from_attrs(id, src, dst, attrs))
    }

    pub fn update_relationship(&mut self, id: &str, attributes: Option<Map<String, Value>>) -> QueryResult<Relationship> {
        let (src, dst) = self
            .graph
            .edge_by_id(id)
            .map(|(s, d, _)| (s.to_string(), d.to_string()))
            .ok_or_else(|| QueryError::NotFound(format!("Relationship '{id}' not found")))?;
        if let Some(attrs) = &attributes {
            reject_reserved(attrs, RESERVED_RELATIONSHIP_KEYS)?;
        }
        let edge_attrs = self
            .graph
            .edge_attrs_mut(id)
            .ok_or_else(|| QueryError::NotFound(format!("Relationship '{id}' not found")))?;
        if let Some(attrs) = attributes {
            for (k, v) in attrs {
                edge_attrs.insert(k, v);
            }
        }
        edge_attrs.insert("updated_at".into(), Value::String(render_timestamp(Utc::now())));
        Ok(relationship_from_attrs(id, &src, &dst, edge_attrs))
    }

    pub fn delete_relationship(&mut self, id: &str) -> QueryResult<()> {
        self.graph
            .remove_edge_by_id(id)
            .map_err(|_| QueryError::NotFound(format!("Relationship '{id}' not found")))
    }

    /// Lowercase the label, collapse runs of non-alphanumerics to a single
    /// underscore, and trim leading/trailing underscores. On collision,
    /// append an underscore and an 8-character lowercase-alphanumeric
    /// suffix derived from a fresh UUID (non-deterministic, matching the
    /// reference implementation's own random-suffix behavior).
    fn derive_entity_id(&self, label: &str) -> String {
        let base = {
            let slug = slugify(label);
            if slug.is_empty() {
                "entity".to_string()
            } else {
                slug
            }
        };
        if !self.graph.has_node(&base) {
            return base;
        }
        loop {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            let candidate = format!("{base}_{}", &suffix[..8]);
            if !self.graph.has_node(&candidate) {
                return candidate;
            }
        }
    }
}

trait SortByScore {
    fn tap_sort_by_score(self) -> Self;
}

impl SortByScore for Vec<SearchHit> {
    fn tap_sort_by_score(mut self) -> Self {
        self.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        self
    }
}

fn reject_reserved(attributes: &Map<String, Value>, reserved: &[&str]) -> QueryResult<()> {
    for key in reserved {
        if attributes.contains_key(*key) {
            return Err(QueryError::Validation(format!(
                "'{key}' is a reserved field and cannot be set through attributes"
            )));
        }
    }
    Ok(())
}

fn slugify(label: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = true;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

fn entity_from_attrs(id: &str, attrs: &Map<String, Value>) -> Entity {
    let mut extra = attrs.clone();
    let label = extra.remove("label").and_then(|v| v.as_str().map(String::from)).unwrap_or_default();
    let entity_type = extra.remove("type").and_then(|v| v.as_str().map(String::from)).unwrap_or_default();
    let description = extra.remove("description").and_then(|v| v.as_str().map(String::from));
    let external_url = extra.remove("external_url").and_then(|v| v.as_str().map(String::from));
    let created_at = extra.remove("created_at").and_then(|v| v.as_str().and_then(parse_timestamp));
    let updated_at = extra.remove("updated_at").and_then(|v| v.as_str().and_then(parse_timestamp));
    Entity {
        id: id.to_string(),
        label,
        entity_type,
        description,
        external_url,
        created_at,
        updated_at,
        attributes: extra,
    }
}

fn relationship_from_attrs(id: &str, source_id: &str, target_id: &str, attrs: &Map<String, Value>) -> Relationship {
    let mut extra = attrs.clone();
    let relationship_type = extra.remove("label").and_then(|v| v.as_str().map(String::from)).unwrap_or_default();
    let created_at = extra.remove("created_at").and_then(|v| v.as_str().and_then(parse_timestamp));
    let updated_at = extra.remove("updated_at").and_then(|v| v.as_str().and_then(parse_timestamp));
    Relationship {
        id: id.to_string(),
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        relationship_type,
        created_at,
        updated_at,
        attributes: extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryEngine {
        let mut engine = QueryEngine::empty();
        engine.create_entity(None, "Feedback Loop", "concept", None, None, Map::new()).unwrap();
        engine.create_entity(None, "Homeostasis", "concept", None, None, Map::new()).unwrap();
        engine.create_entity(None, "Cybernetics", "field", None, None, Map::new()).unwrap();
        engine
            .create_relationship("feedback_loop", "homeostasis", "enables", Map::new())
            .unwrap();
        engine
            .create_relationship("cybernetics", "feedback_loop", "includes", Map::new())
            .unwrap();
        engine
    }

    #[test]
    fn creates_entities_with_derived_ids_and_timestamps() {
        let mut engine = QueryEngine::empty();
        let e1 = engine.create_entity(None, "Feedback Loop", "concept", None, None, Map::new()).unwrap();
        assert_eq!(e1.id, "feedback_loop");
        assert!(e1.created_at.is_some());

        let e2 = engine.create_entity(None, "Feedback Loop", "concept", None, None, Map::new()).unwrap();
        let re = regex_lite_match(&e2.id);
        assert!(re, "expected id matching /^feedback_loop_[a-z0-9]{{8}}$/, got {}", e2.id);
    }

    fn regex_lite_match(id: &str) -> bool {
        let Some(suffix) = id.strip_prefix("feedback_loop_") else {
            return false;
        };
        suffix.len() == 8 && suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    }

    #[test]
    fn explicit_id_is_honored_and_duplicate_is_rejected() {
        let mut engine = QueryEngine::empty();
        let e1 = engine
            .create_entity(Some("alpha"), "Alpha", "concept", None, None, Map::new())
            .unwrap();
        assert_eq!(e1.id, "alpha");

        let err = engine
            .create_entity(Some("alpha"), "Alpha Again", "concept", None, None, Map::new())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_reserved_attribute_keys() {
        let mut engine = QueryEngine::empty();
        let mut attrs = Map::new();
        attrs.insert("created_at".into(), Value::String("nope".into()));
        let err = engine.create_entity(None, "X", "concept", None, None, attrs).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn find_paths_and_query_entity_round_trip() {
        let engine = sample();
        let paths = engine.find_paths("cybernetics", "homeostasis", 3);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 3);

        let entity = engine.query_entity("feedback_loop").unwrap();
        assert_eq!(entity["outgoing"].as_array().unwrap().len(), 1);
        assert_eq!(entity["incoming"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_relationship_is_rejected() {
        let mut engine = sample();
        let err = engine
            .create_relationship("feedback_loop", "homeostasis", "enables", Map::new())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn self_loop_relationship_is_rejected() {
        let mut engine = sample();
        let err = engine
            .create_relationship("feedback_loop", "feedback_loop", "self_refers", Map::new())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn delete_entity_requires_cascade_when_connected() {
        let mut engine = sample();
        let blocked = engine.delete_entity("feedback_loop", false).unwrap();
        assert_eq!(blocked["success"], false);
        assert!(blocked["message"].as_str().unwrap().contains("cascade=true"));

        let ok = engine.delete_entity("feedback_loop", true).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["relationships_removed"], 2);
    }

    #[test]
    fn delete_entity_missing_id_is_not_found_not_error() {
        let mut engine = sample();
        let result = engine.delete_entity("does_not_exist", false).unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["not_found"], true);
    }

    #[test]
    fn search_ranks_exact_match_first() {
        let engine = sample();
        let hits = engine.search_entities("homeostasis", None);
        assert_eq!(hits[0].id, "homeostasis");
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn search_respects_entity_types_filter() {
        let engine = sample();
        let types = vec!["field".to_string()];
        let hits = engine.search_entities("c", Some(&types));
        assert!(hits.iter().all(|h| h.entity_type == "field"));
        assert!(hits.iter().any(|h| h.id == "cybernetics"));
    }

    #[test]
    fn related_concepts_prefix_incoming_with_inverse() {
        let engine = sample();
        let related = engine.get_related_concepts("feedback_loop", None).unwrap();
        assert!(related.contains_key("enables"));
        assert!(related.contains_key("inverse_includes"));
    }

    #[test]
    fn find_connections_groups_by_distance() {
        let mut engine = sample();
        engine.create_entity(None, "Regulation", "concept", None, None, Map::new()).unwrap();
        engine
            .create_relationship("homeostasis", "regulation", "enables", Map::new())
            .unwrap();
        let shells = engine.find_connections("cybernetics", 2).unwrap();
        assert_eq!(shells.get(&1).unwrap().len(), 1);
        assert_eq!(shells.get(&2).unwrap().len(), 1);
    }

    #[test]
    fn hierarchy_roots_require_out_degree() {
        let engine = sample();
        let hierarchy = engine.analyze_concept_hierarchy().unwrap();
        let roots = hierarchy["root_nodes"].as_array().unwrap();
        assert!(roots.iter().any(|r| r["id"] == "cybernetics"));
        assert!(!roots.iter().any(|r| r["id"] == "homeostasis"));
    }

    #[test]
    fn list_entities_paginates_and_sorts() {
        let engine = sample();
        let page = engine.list_entities(None, None, 2, 0, "id", "asc");
        assert_eq!(page["total"], 3);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);
        assert_eq!(page["items"][0]["id"], "cybernetics");
    }

    #[test]
    fn list_relationships_filters_by_entity_id() {
        let engine = sample();
        let page = engine.list_relationships(None, None, Some("feedback_loop"), None, 50, 0, "id", "asc");
        assert_eq!(page["total"], 2);
    }

    #[test]
    fn round_trips_through_persistence_document() {
        let engine = sample();
        let raw = engine.to_document().to_pretty_string().unwrap();
        let reloaded = QueryEngine::from_document(PersistenceDocument::from_str(&raw).unwrap()).unwrap();
        assert_eq!(reloaded.graph.node_count(), 3);
        assert_eq!(reloaded.graph.edge_count(), 2);
    }

    #[test]
    fn round_trip_preserves_unknown_keys() {
        let raw = r#"{
            "structured_ontology": {},
            "knowledge_graph": {
                "directed": true,
                "multigraph": false,
                "graph": {"name": "cybernetics"},
                "nodes": [],
                "edges": [],
                "schema_version": 3
            },
            "generated_by": "ingest-pipeline"
        }"#;
        let engine = QueryEngine::from_document(PersistenceDocument::from_str(raw).unwrap()).unwrap();
        let doc = engine.to_document();
        assert_eq!(doc.extra.get("generated_by"), Some(&Value::String("ingest-pipeline".into())));
        assert_eq!(doc.knowledge_graph.extra.get("schema_version"), Some(&json!(3)));
        assert_eq!(doc.knowledge_graph.graph, json!({"name": "cybernetics"}));
    }

    #[test]
    fn save_changes_round_trips_through_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontology.json");
        let engine = sample();
        engine.save_to_path(&path).unwrap();

        let reloaded = QueryEngine::load_from_path(&path).unwrap();
        assert_eq!(reloaded.graph.node_count(), 3);
        assert_eq!(reloaded.graph.edge_count(), 2);
    }
}
