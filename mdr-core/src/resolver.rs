// mdr-core/src/resolver.rs
//! Graph construction.
//!
//! The graph is built level by level from the root. All edges of a level are applied
//! before any node of the next level gets its version, so sibling constraints are
//! always seen together. Descriptors for a level are fetched concurrently and applied
//! in a fixed order.
//!
//! A node's version is fixed once per pass. When a constraint discovered later would
//! change an already fixed version, the constraint is remembered and the graph is
//! rebuilt from scratch with it, up to [`MAX_PASSES`] times. Metadata and version
//! listings are memoised across passes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mdr_common::dependency::{
    BomNode, DeclaredDependency, DependencyGraph, DependencyOrigin, Message, NodeId, NodeKind, Severity,
};
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{Coordinates, ModuleKey, Version, VersionConstraint};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::constraints::{ConstraintTable, Requirement, Selection};
use crate::context::ResolutionSettings;
use crate::descriptor::Descriptor;
use crate::download::download_artifacts;
use crate::metadata::{available_versions, describe, describe_bom, BomDescription};

pub const MAX_PASSES: usize = 16;

/// Dependencies grouped under a local module node.
#[derive(Debug, Clone, Default)]
pub struct ModuleDependencyNode {
    pub name: String,
    pub dependencies: Vec<DeclaredDependency>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphRequest {
    pub root_name: String,
    /// Dependencies hanging directly off the root.
    pub dependencies: Vec<DeclaredDependency>,
    pub modules: Vec<ModuleDependencyNode>,
    /// BOMs contribute versions only; they are not children of the root.
    pub boms: Vec<Coordinates>,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    settings: ResolutionSettings,
}

/// State shared by every pass of one `build_graph` call.
#[derive(Default)]
struct Memo {
    descriptors: HashMap<Coordinates, Result<Arc<Descriptor>>>,
    listings: HashMap<ModuleKey, Vec<Version>>,
}

type Learned = Vec<(ModuleKey, Requirement)>;

impl Resolver {
    pub fn create_for(settings: ResolutionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ResolutionSettings {
        &self.settings
    }

    pub async fn build_graph(&self, request: &GraphRequest) -> Result<DependencyGraph> {
        self.settings.check_cancelled()?;
        let boms = self.describe_boms(&request.boms).await?;
        let mut memo = Memo::default();
        let mut learned: Learned = Vec::new();

        for pass in 1..=MAX_PASSES {
            let last = pass == MAX_PASSES;
            let mut builder = GraphBuilder::new(&self.settings, &mut memo, &request.root_name, !last);
            builder.seed(&boms, &learned);
            builder.run(request).await?;
            let (mut graph, restart) = builder.finish();

            if restart.is_empty() {
                debug!("Graph complete after {} pass(es), {} node(s)", pass, graph.len());
                return Ok(graph);
            }
            if last {
                let root = graph.root();
                graph.node_mut(root).push_message(Message::warning(
                    "ResolutionNotStable",
                    format!(
                        "Versions were still changing after {MAX_PASSES} passes: {}",
                        restart.iter().map(|(k, r)| format!("{k} {r}")).collect::<Vec<_>>().join("; ")
                    ),
                ));
                return Ok(graph);
            }
            info!("Pass {} found {} new constraint(s), rebuilding the graph", pass, restart.len());
            for item in restart {
                if !learned.contains(&item) {
                    learned.push(item);
                }
            }
        }
        Err(MdrError::Generic("graph construction ran out of passes".to_string()))
    }

    /// Fetches every artifact of the graph into the cache and records the files on
    /// their nodes.
    pub async fn download_dependencies(&self, graph: &mut DependencyGraph) -> Result<()> {
        download_artifacts(&self.settings, graph).await
    }

    async fn describe_boms(&self, boms: &[Coordinates]) -> Result<Vec<(Coordinates, Result<BomDescription>)>> {
        let mut described = Vec::with_capacity(boms.len());
        for bom in boms {
            debug!("Resolving BOM {}", bom);
            let result = describe_bom(&self.settings, bom).await;
            if matches!(result, Err(MdrError::Cancelled)) {
                return Err(MdrError::Cancelled);
            }
            described.push((bom.clone(), result));
        }
        Ok(described)
    }
}

struct GraphBuilder<'a> {
    settings: &'a ResolutionSettings,
    memo: &'a mut Memo,
    graph: DependencyGraph,
    table: ConstraintTable,
    /// Nodes whose version decision has been made in this pass.
    settled: HashSet<NodeId>,
    restart: Learned,
    stop_early: bool,
}

impl<'a> GraphBuilder<'a> {
    fn new(settings: &'a ResolutionSettings, memo: &'a mut Memo, root_name: &str, stop_early: bool) -> Self {
        let root_name = if root_name.is_empty() { "root" } else { root_name };
        Self {
            settings,
            memo,
            graph: DependencyGraph::new(root_name),
            table: ConstraintTable::new(),
            settled: HashSet::new(),
            restart: Vec::new(),
            stop_early,
        }
    }

    fn finish(self) -> (DependencyGraph, Learned) {
        (self.graph, self.restart)
    }

    fn seed(&mut self, boms: &[(Coordinates, Result<BomDescription>)], learned: &Learned) {
        for (coordinates, description) in boms {
            let managed = match description {
                Ok(d) => d.managed.clone(),
                Err(_) => Vec::new(),
            };
            let id = self.graph.add_node(NodeKind::BomConstraint(BomNode {
                coordinates: coordinates.clone(),
                managed: managed.clone(),
            }));
            match description {
                Ok(d) => {
                    for message in &d.messages {
                        self.graph.node_mut(id).push_message(message.clone());
                    }
                }
                Err(e) => self.graph.node_mut(id).push_error(e),
            }
            let source = format!("bom {coordinates}");
            for version in managed {
                self.table.add(
                    &version.key,
                    Requirement { constraint: version.constraint, origin: DependencyOrigin::Bom, source: source.clone() },
                );
            }
        }
        for (key, requirement) in learned {
            self.table.add(key, requirement.clone());
        }
    }

    async fn run(&mut self, request: &GraphRequest) -> Result<()> {
        let root = self.graph.root();
        let mut edges: Vec<(NodeId, DeclaredDependency)> =
            sorted(request.dependencies.clone()).into_iter().map(|d| (root, d)).collect();
        for group in &request.modules {
            let id = self.graph.add_node(NodeKind::Module { name: group.name.clone() });
            if let Err(cycle) = self.graph.add_edge(root, id) {
                self.cycle(root, &cycle.path);
                continue;
            }
            edges.extend(sorted(group.dependencies.clone()).into_iter().map(|d| (id, d)));
        }

        let mut level = 0usize;
        while !edges.is_empty() {
            self.settings.check_cancelled()?;
            debug!("Level {}: {} edge(s)", level, edges.len());
            let fresh = self.apply_edges(edges).await?;
            let fixed = self.fix_versions(&fresh).await?;
            self.fetch_descriptors(&fixed).await?;
            edges = self.expand(&fixed).await?;
            if self.stop_early && !self.restart.is_empty() {
                debug!("Stopping pass at level {} to rebuild", level);
                return Ok(());
            }
            level += 1;
        }
        Ok(())
    }

    /// Adds the edges of one level. Returns the nodes created by them.
    async fn apply_edges(&mut self, edges: Vec<(NodeId, DeclaredDependency)>) -> Result<Vec<NodeId>> {
        let mut fresh = Vec::new();
        for (parent, dependency) in edges {
            let (child, created) = self.graph.maven_node(&dependency.key);
            if let Err(cycle) = self.graph.add_edge(parent, child) {
                self.cycle(parent, &cycle.path);
                continue;
            }
            if created {
                fresh.push(child);
            }
            let Some(constraint) = dependency.constraint else {
                continue;
            };
            if let Some(maven) = self.graph.node_mut(child).as_maven_mut() {
                maven.request(parent, constraint.clone());
            }
            let requirement = Requirement { constraint, origin: dependency.origin, source: self.source_of(parent) };
            self.constrain(&dependency.key, requirement).await?;
        }
        Ok(fresh)
    }

    fn cycle(&mut self, parent: NodeId, path: &[String]) {
        let err = MdrError::CyclicDependency(path.join(" -> "));
        warn!("{}", err);
        self.graph.node_mut(parent).push_error(&err);
    }

    fn source_of(&self, id: NodeId) -> String {
        let node = self.graph.node(id);
        match node.as_maven() {
            Some(maven) => maven.coordinates().to_string(),
            None => node.label(),
        }
    }

    /// Records a requirement. If it would change a version already decided in this
    /// pass, the requirement is kept for the next pass.
    async fn constrain(&mut self, key: &ModuleKey, requirement: Requirement) -> Result<()> {
        if !self.table.add(key, requirement.clone()) {
            return Ok(());
        }
        let Some(id) = self.graph.find_maven(key) else {
            return Ok(());
        };
        if !self.settled.contains(&id) {
            return Ok(());
        }
        let fixed = self
            .graph
            .node(id)
            .as_maven()
            .and_then(|m| m.resolved_version())
            .map(Version::parse);
        let listed = self.listing(key).await?;
        let now = self.table.select(key, &listed);
        if now.version() != fixed.as_ref() {
            debug!("{} ({}) would change the version of {}", requirement, key, key);
            self.restart.push((key.clone(), requirement));
        }
        Ok(())
    }

    /// Version listing of `key`, fetched only when a range constrains it.
    async fn listing(&mut self, key: &ModuleKey) -> Result<Vec<Version>> {
        if !self.table.has_range(key) {
            return Ok(Vec::new());
        }
        if let Some(listed) = self.memo.listings.get(key) {
            return Ok(listed.clone());
        }
        let listed = match available_versions(self.settings, key).await {
            Ok(listed) => listed,
            Err(MdrError::Cancelled) => return Err(MdrError::Cancelled),
            Err(e) => {
                warn!("Could not list versions of {}: {}", key, e);
                Vec::new()
            }
        };
        self.memo.listings.insert(key.clone(), listed.clone());
        Ok(listed)
    }

    async fn fix_versions(&mut self, fresh: &[NodeId]) -> Result<Vec<(NodeId, Coordinates)>> {
        let mut fixed = Vec::with_capacity(fresh.len());
        for id in fresh {
            let Some(key) = self.graph.node(*id).as_maven().map(|m| m.key.clone()) else {
                continue;
            };
            let listed = self.listing(&key).await?;
            let selection = self.table.select(&key, &listed);
            self.settled.insert(*id);

            let node = self.graph.node_mut(*id);
            let (version, problem) = match selection {
                Selection::Chosen(v) => (v, None),
                Selection::Conflict { fallback, reason } => {
                    (fallback, Some(MdrError::VersionConflictUnresolved(reason)))
                }
                Selection::Unversioned => {
                    node.push_message(Message::error("Unversioned", format!("No version was requested for {key}")));
                    continue;
                }
            };
            let Some(maven) = node.as_maven_mut() else {
                continue;
            };
            maven.fix_version(version.as_str())?;
            let upgraded_from = maven
                .requested
                .iter()
                .find(|c| matches!(c, VersionConstraint::Soft(v) if *v != version))
                .map(ToString::to_string);
            let coordinates = maven.coordinates();
            if let Some(err) = problem {
                warn!("{}", err);
                node.push_error(&err);
            }
            if let Some(requested) = upgraded_from {
                node.push_message(Message::info(
                    "VersionChanged",
                    format!("{key}: requested {requested}, resolved {version}"),
                ));
            }
            fixed.push((*id, coordinates));
        }
        Ok(fixed)
    }

    /// Fetches the descriptors of a level that are not memoised yet, at most
    /// `max_concurrent_fetches` at a time.
    async fn fetch_descriptors(&mut self, fixed: &[(NodeId, Coordinates)]) -> Result<()> {
        let missing: Vec<Coordinates> = fixed
            .iter()
            .map(|(_, c)| c.clone())
            .filter(|c| !self.memo.descriptors.contains_key(c))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_fetches.max(1)));
        let mut join_set = JoinSet::new();
        for coordinates in missing {
            let settings = self.settings.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => describe(&settings, &coordinates).await,
                    Err(e) => Err(MdrError::Generic(format!("Fetch limiter closed: {e}"))),
                };
                (coordinates, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (coordinates, result) =
                joined.map_err(|e| MdrError::Generic(format!("Descriptor task failed: {e}")))?;
            if matches!(result, Err(MdrError::Cancelled)) {
                join_set.abort_all();
                return Err(MdrError::Cancelled);
            }
            if let Err(e) = &result {
                debug!("Could not describe {}: {}", coordinates, e);
            }
            self.memo.descriptors.insert(coordinates, result.map(Arc::new));
        }
        Ok(())
    }

    /// Applies the descriptors of a level and returns the edges of the next one.
    async fn expand(&mut self, fixed: &[(NodeId, Coordinates)]) -> Result<Vec<(NodeId, DeclaredDependency)>> {
        let mut next = Vec::new();
        for (id, coordinates) in fixed {
            let descriptor = match self.memo.descriptors.get(coordinates) {
                Some(Ok(d)) => Arc::clone(d),
                Some(Err(e)) => {
                    let e = e.clone();
                    self.graph.node_mut(*id).push_error(&e);
                    continue;
                }
                None => continue,
            };

            let node = self.graph.node_mut(*id);
            for message in &descriptor.messages {
                node.push_message(message.clone());
            }
            if let Some(maven) = node.as_maven_mut() {
                maven.variant = descriptor.variant.clone();
                maven.artifacts = descriptor.artifacts.clone();
                maven.source_sets = descriptor.source_sets.clone();
            }

            let source = coordinates.to_string();
            for edge in &descriptor.constraints {
                match edge.constraint() {
                    Ok(Some(constraint)) => {
                        let requirement =
                            Requirement { constraint, origin: DependencyOrigin::Transitive, source: source.clone() };
                        self.constrain(&edge.key(), requirement).await?;
                    }
                    Ok(None) => {}
                    Err(e) => self.graph.node_mut(*id).push_message(Message::from_error(&e, Severity::Warning)),
                }
            }

            let mut dependencies = Vec::with_capacity(descriptor.dependencies.len());
            for edge in &descriptor.dependencies {
                match edge.constraint() {
                    Ok(constraint) => dependencies.push(DeclaredDependency::new(
                        edge.key(),
                        constraint,
                        DependencyOrigin::Transitive,
                    )),
                    Err(e) => self.graph.node_mut(*id).push_message(Message::from_error(&e, Severity::Warning)),
                }
            }
            next.extend(sorted(dependencies).into_iter().map(|d| (*id, d)));
        }
        Ok(next)
    }
}

/// Siblings are visited in coordinate order.
fn sorted(mut dependencies: Vec<DeclaredDependency>) -> Vec<DeclaredDependency> {
    dependencies.sort_by_key(DeclaredDependency::sort_key);
    dependencies
}
