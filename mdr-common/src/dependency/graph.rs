// mdr-common/src/dependency/graph.rs
//! Arena-backed dependency graph. Nodes are addressed by [`NodeId`]; Maven nodes are
//! unique per `group:module`, which is what lets several parents share one resolved node.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::dependency::message::Message;
use crate::dependency::node::{DependencyNode, MavenNode, NodeId, NodeKind};
use crate::model::artifact::ResolvedFile;
use crate::model::coordinates::ModuleKey;
use crate::model::version::{Version, VersionConstraint};

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    maven_index: HashMap<ModuleKey, NodeId>,
}

/// Returned by [`DependencyGraph::add_edge`] when the edge would close a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDetected {
    /// Labels along the cycle, starting and ending at the parent.
    pub path: Vec<String>,
}

impl DependencyGraph {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = DependencyNode::new(NodeId(0), NodeKind::Root { name: root_name.into() });
        Self { nodes: vec![root], maven_index: HashMap::new() }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &DependencyNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DependencyNode {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.iter()
    }

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let NodeKind::Maven(m) = &kind {
            self.maven_index.insert(m.key.clone(), id);
        }
        self.nodes.push(DependencyNode::new(id, kind));
        id
    }

    /// Canonical node of a module, creating it on first sight.
    pub fn maven_node(&mut self, key: &ModuleKey) -> (NodeId, bool) {
        if let Some(id) = self.maven_index.get(key) {
            return (*id, false);
        }
        (self.add_node(NodeKind::Maven(MavenNode::new(key.clone()))), true)
    }

    pub fn find_maven(&self, key: &ModuleKey) -> Option<NodeId> {
        self.maven_index.get(key).copied()
    }

    /// Adds `parent -> child` unless it already exists. Refuses edges that would make
    /// `parent` reachable from itself.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), CycleDetected> {
        if self.nodes[parent.0].children.contains(&child) {
            return Ok(());
        }
        if let Some(path) = self.path_between(child, parent) {
            let mut labels: Vec<String> = std::iter::once(parent)
                .chain(path)
                .map(|id| self.nodes[id.0].label())
                .collect();
            labels.dedup();
            return Err(CycleDetected { path: labels });
        }
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parents.push(parent);
        Ok(())
    }

    /// A path `from ..= to` along child edges, if one exists.
    fn path_between(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut previous: HashMap<NodeId, NodeId> = HashMap::new();
        let mut visited = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(prev) = previous.get(&cursor) {
                    path.push(*prev);
                    cursor = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for child in &self.nodes[current.0].children {
                if visited.insert(*child) {
                    previous.insert(*child, current);
                    queue.push_back(*child);
                }
            }
        }
        None
    }

    /// Dependency insight: a copy of the graph keeping only the edges on root paths to
    /// the node of `key`, which is left without children. With `resolved_only`, only
    /// parents whose own request yields the resolved version are followed. When no
    /// parent does, the version was forced from elsewhere: every parent is kept and the
    /// BOMs managing that version are hung off the root above the node.
    ///
    /// A module missing from the graph gives a lone root.
    pub fn filter_paths(&self, key: &ModuleKey, resolved_only: bool) -> DependencyGraph {
        let mut view = self.clone();
        for node in &mut view.nodes {
            node.children.clear();
            node.parents.clear();
        }
        let order = self.bfs();
        let reachable: HashSet<NodeId> = order.iter().copied().collect();
        let Some(target) = self.find_maven(key).filter(|id| reachable.contains(id)) else {
            return view;
        };
        let Some(maven) = self.nodes[target.0].as_maven() else {
            return view;
        };
        let resolved = maven.resolved_version().map(Version::parse);
        let yields = |constraint: &VersionConstraint| {
            !resolved_only || resolved.as_ref().is_some_and(|v| yields_version(constraint, v))
        };

        let parents: Vec<NodeId> = self.nodes[target.0]
            .parents
            .iter()
            .copied()
            .filter(|p| reachable.contains(p))
            .collect();
        let decisive: Vec<NodeId> = parents
            .iter()
            .copied()
            .filter(|p| maven.requested_by(*p).any(|c| yields(c)))
            .collect();
        let (entries, boms) = if resolved_only && !decisive.is_empty() {
            (decisive, Vec::new())
        } else {
            let boms: Vec<NodeId> = self
                .nodes
                .iter()
                .filter(|n| match &n.kind {
                    NodeKind::BomConstraint(bom) => {
                        bom.managed.iter().any(|m| m.key == *key && yields(&m.constraint))
                    }
                    _ => false,
                })
                .map(|n| n.id)
                .collect();
            (parents, boms)
        };

        // Reachable ancestors of an entry all lie on some root path to the target.
        let mut keep: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = entries.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if keep.insert(id) {
                queue.extend(self.nodes[id.0].parents.iter().copied().filter(|p| reachable.contains(p)));
            }
        }
        for id in order.into_iter().filter(|id| keep.contains(id)) {
            for child in &self.nodes[id.0].children {
                if keep.contains(child) || (*child == target && entries.contains(&id)) {
                    view.link(id, *child);
                }
            }
        }
        for bom in boms {
            view.link(view.root(), bom);
            view.link(bom, target);
        }
        view
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parents.push(parent);
    }

    /// Every node reachable from the root, each once, breadth-first.
    pub fn bfs(&self) -> Vec<NodeId> {
        let mut seen = HashSet::from([self.root()]);
        let mut order = vec![self.root()];
        let mut queue = VecDeque::from([self.root()]);
        while let Some(current) = queue.pop_front() {
            for child in &self.nodes[current.0].children {
                if seen.insert(*child) {
                    order.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        order
    }

    /// Parents before children (Kahn's algorithm over the reachable subgraph). Ties are
    /// broken by breadth-first position so the order is stable.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let reachable = self.bfs();
        let position: HashMap<NodeId, usize> =
            reachable.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut in_degree: HashMap<NodeId, usize> = reachable.iter().map(|id| (*id, 0)).collect();
        for id in &reachable {
            for child in &self.nodes[id.0].children {
                *in_degree.entry(*child).or_default() += 1;
            }
        }

        let mut ready: BTreeMap<usize, NodeId> = reachable
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .map(|id| (position[id], *id))
            .collect();
        let mut sorted = Vec::with_capacity(reachable.len());
        while let Some((_, current)) = ready.pop_first() {
            sorted.push(current);
            for child in &self.nodes[current.0].children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(position[child], *child);
                    }
                }
            }
        }
        sorted
    }

    /// All messages of reachable nodes in breadth-first order, followed by those of
    /// nodes that are no longer reachable.
    pub fn messages(&self) -> Vec<Message> {
        let reachable = self.bfs();
        let reachable_set: HashSet<NodeId> = reachable.iter().copied().collect();
        reachable
            .iter()
            .copied()
            .chain(self.nodes.iter().map(|n| n.id).filter(|id| !reachable_set.contains(id)))
            .flat_map(|id| self.nodes[id.0].messages().iter().cloned())
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.nodes.iter().any(DependencyNode::has_errors)
    }

    /// Downloaded files in topological order.
    pub fn files(&self) -> Vec<ResolvedFile> {
        let mut seen = HashSet::new();
        self.topological_order()
            .into_iter()
            .filter_map(|id| self.nodes[id.0].as_maven())
            .flat_map(|m| m.files.iter())
            .filter(|f| seen.insert(f.path.clone()))
            .cloned()
            .collect()
    }

    /// Chosen version per module, sorted by module key.
    pub fn versions(&self) -> BTreeMap<ModuleKey, String> {
        self.bfs()
            .into_iter()
            .filter_map(|id| self.nodes[id.0].as_maven())
            .filter_map(|m| m.resolved_version().map(|v| (m.key.clone(), v.to_string())))
            .collect()
    }

    /// Gradle-style tree. Subtrees printed before are marked ` (*)`.
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        let mut visited = HashSet::new();
        self.print_node(self.root(), &mut String::new(), &mut out, &mut visited);
        out
    }

    fn print_node(&self, id: NodeId, indent: &mut String, out: &mut String, visited: &mut HashSet<NodeId>) {
        let node = &self.nodes[id.0];
        out.push_str(indent);
        out.push_str(&node.label());
        let seen = !visited.insert(id);
        if seen && !node.children.is_empty() {
            out.push_str(" (*)");
        }
        out.push('\n');
        if seen || node.children.is_empty() {
            return;
        }

        // The connector drawn for this node turns into a plain continuation for its children.
        if let Some(stripped) = replace_connector(indent) {
            *indent = stripped;
        }
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            let len_before = indent.len();
            indent.push_str(if i + 1 < count { "├─── " } else { "╰─── " });
            self.print_node(*child, indent, out, visited);
            indent.truncate(len_before);
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let nodes: Vec<GraphJsonNode> = self
            .bfs()
            .into_iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                GraphJsonNode {
                    id: id.0,
                    label: node.label(),
                    version: node.as_maven().and_then(|m| m.resolved_version().map(str::to_string)),
                    variant: node.as_maven().and_then(|m| m.variant.clone()),
                    children: node.children.iter().map(|c| c.0).collect(),
                    files: node
                        .as_maven()
                        .map(|m| m.files.iter().map(|f| f.path.display().to_string()).collect())
                        .unwrap_or_default(),
                    messages: node.messages().to_vec(),
                }
            })
            .collect();
        serde_json::json!({ "nodes": nodes })
    }
}

/// Whether `constraint` on its own would have picked `version`.
fn yields_version(constraint: &VersionConstraint, version: &Version) -> bool {
    match constraint.nominated() {
        Some(nominated) => nominated == version,
        None => constraint.is_satisfied_by(version),
    }
}

/// Turns a trailing `├─── ` into `│    ` and a trailing `╰─── ` into five spaces.
fn replace_connector(indent: &str) -> Option<String> {
    if let Some(prefix) = indent.strip_suffix("├─── ") {
        return Some(format!("{prefix}│    "));
    }
    indent
        .strip_suffix("╰─── ")
        .map(|prefix| format!("{prefix}     "))
}

#[derive(Serialize)]
struct GraphJsonNode {
    id: usize,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    children: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<Message>,
}
