// mdr-core/src/api.rs
//! Caller-facing entry points.
//!
//! [`MavenResolver`] owns one file cache; every resolution it runs shares that cache,
//! so concurrent resolutions of the same coordinates download each file once.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use mdr_common::config::Config;
use mdr_common::dependency::{DeclaredDependency, DependencyGraph, Message, Severity};
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{Coordinates, ModuleKey, ResolutionPlatform, ResolutionScope, ResolvedFile};
use mdr_net::Transport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::FileCache;
use crate::context::{build_file_cache, build_file_cache_with, ResolutionSettings};
use crate::resolver::{GraphRequest, ModuleDependencyNode, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPolicy {
    /// Any ERROR diagnostic fails the resolution.
    #[default]
    Strict,
    /// ERROR diagnostics are returned alongside whatever could be resolved.
    Lenient,
}

/// Dependencies declared by one local module.
#[derive(Debug, Clone, Default)]
pub struct ModuleRequest {
    pub name: String,
    pub dependencies: Vec<Coordinates>,
}

#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub dependencies: Vec<Coordinates>,
    pub modules: Vec<ModuleRequest>,
    pub boms: Vec<Coordinates>,
    pub scope: ResolutionScope,
    pub platforms: Vec<ResolutionPlatform>,
    pub policy: ResolutionPolicy,
}

impl ResolutionRequest {
    pub fn new(dependencies: Vec<Coordinates>) -> Self {
        Self {
            dependencies,
            modules: Vec::new(),
            boms: Vec::new(),
            scope: ResolutionScope::Compile,
            platforms: vec![ResolutionPlatform::Jvm],
            policy: ResolutionPolicy::Strict,
        }
    }

    pub fn with_scope(mut self, scope: ResolutionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<ResolutionPlatform>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_boms(mut self, boms: Vec<Coordinates>) -> Self {
        self.boms = boms;
        self
    }

    pub fn with_module(mut self, module: ModuleRequest) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn to_graph_request(&self) -> Result<GraphRequest> {
        let direct = |coordinates: &[Coordinates]| -> Result<Vec<DeclaredDependency>> {
            coordinates.iter().map(DeclaredDependency::direct).collect()
        };
        let modules = self
            .modules
            .iter()
            .map(|m| Ok(ModuleDependencyNode { name: m.name.clone(), dependencies: direct(&m.dependencies)? }))
            .collect::<Result<Vec<_>>>()?;
        Ok(GraphRequest {
            root_name: "root".to_string(),
            dependencies: direct(&self.dependencies)?,
            modules,
            boms: self.boms.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// Downloaded files in topological order.
    pub files: Vec<ResolvedFile>,
    pub diagnostics: Vec<Message>,
    pub versions: BTreeMap<ModuleKey, String>,
    pub graph: DependencyGraph,
}

impl ResolutionOutcome {
    pub fn from_graph(graph: DependencyGraph) -> Self {
        Self { files: graph.files(), diagnostics: graph.messages(), versions: graph.versions(), graph }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.diagnostics.iter().filter(|m| m.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// The first ERROR becomes the primary failure, the rest are listed as suppressed.
    pub fn into_result(self) -> Result<Self> {
        let mut errors: Vec<String> = self.errors().map(ToString::to_string).collect();
        if errors.is_empty() {
            return Ok(self);
        }
        let primary = errors.remove(0);
        Err(MdrError::ResolutionFailed { primary, suppressed: errors })
    }
}

#[derive(Debug, Clone)]
pub struct MavenResolver {
    config: Config,
    cache: Arc<FileCache>,
    /// Parent of the tokens handed to running resolutions. Replaced once cancelled.
    cancel: Arc<Mutex<CancellationToken>>,
}

impl MavenResolver {
    pub fn new(config: Config) -> Result<Self> {
        let cache = build_file_cache(&config, CancellationToken::new())?;
        Ok(Self::from_parts(config, cache))
    }

    /// Same as [`MavenResolver::new`] but reads repositories through `transport`.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let cache = build_file_cache_with(&config, transport, CancellationToken::new())?;
        Ok(Self::from_parts(config, cache))
    }

    fn from_parts(config: Config, cache: Arc<FileCache>) -> Self {
        Self { config, cache, cancel: Arc::new(Mutex::new(CancellationToken::new())) }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    /// Cancelling this token stops the resolutions currently running on this resolver.
    /// Resolutions started afterwards run under a fresh token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// A child of the current parent token, renewing the parent if it was cancelled.
    fn resolution_token(&self) -> CancellationToken {
        let mut parent = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if parent.is_cancelled() {
            debug!("Previous resolutions were cancelled, starting a fresh token");
            *parent = CancellationToken::new();
        }
        parent.child_token()
    }

    pub async fn resolve(
        &self,
        coordinates: &[Coordinates],
        scope: ResolutionScope,
        platform: ResolutionPlatform,
    ) -> Result<ResolutionOutcome> {
        let request = ResolutionRequest::new(coordinates.to_vec())
            .with_scope(scope)
            .with_platforms(vec![platform]);
        self.resolve_request(&request).await
    }

    pub async fn resolve_request(&self, request: &ResolutionRequest) -> Result<ResolutionOutcome> {
        let cancel = self.resolution_token();
        let settings = ResolutionSettings::new(Arc::clone(&self.cache), request.scope, request.platforms.clone())
            .with_config(&self.config)
            .with_cancel(cancel.clone());
        // Dropping the run aborts its spawned tasks.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MdrError::Cancelled),
            outcome = self.run(request, settings) => outcome,
        }
    }

    async fn run(&self, request: &ResolutionRequest, settings: ResolutionSettings) -> Result<ResolutionOutcome> {
        info!(
            "Resolving {} dependency(ies) for {} on {}",
            request.dependencies.len() + request.modules.iter().map(|m| m.dependencies.len()).sum::<usize>(),
            settings.scope,
            settings.platforms.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );

        let resolver = Resolver::create_for(settings);
        let mut graph = resolver.build_graph(&request.to_graph_request()?).await?;
        resolver.download_dependencies(&mut graph).await?;

        let outcome = ResolutionOutcome::from_graph(graph);
        debug!(
            "Resolved {} module(s), {} file(s), {} diagnostic(s)",
            outcome.versions.len(),
            outcome.files.len(),
            outcome.diagnostics.len()
        );
        match request.policy {
            ResolutionPolicy::Strict => outcome.into_result(),
            ResolutionPolicy::Lenient => Ok(outcome),
        }
    }
}
