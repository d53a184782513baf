// mdr-core/src/download.rs
//! Artifact download phase. Runs after the graph is complete and only touches nodes
//! reachable from the root.

use std::sync::Arc;

use mdr_common::cache::{CacheKey, FileKind};
use mdr_common::dependency::{ArtifactFile, DependencyGraph, Message, NodeId};
use mdr_common::error::{MdrError, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{CachedFile, FileRequest};
use crate::context::ResolutionSettings;

type Fetched = (NodeId, usize, ArtifactFile, Result<Option<CachedFile>>);

pub async fn download_artifacts(settings: &ResolutionSettings, graph: &mut DependencyGraph) -> Result<()> {
    settings.check_cancelled()?;

    let mut wanted: Vec<(NodeId, usize, ArtifactFile)> = Vec::new();
    for id in graph.bfs() {
        let Some(maven) = graph.node_mut(id).as_maven_mut() else {
            continue;
        };
        maven.files.clear();
        wanted.extend(maven.artifacts.iter().cloned().enumerate().map(|(i, a)| (id, i, a)));
    }
    debug!("Downloading {} artifact(s)", wanted.len());

    let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1)));
    let mut join_set: JoinSet<Fetched> = JoinSet::new();
    for (id, index, artifact) in wanted {
        let cache = Arc::clone(&settings.cache);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let request = FileRequest::new(CacheKey { kind: FileKind::Artifact, repository_path: artifact.path.clone() })
                .with_expectations(artifact.hashes.clone(), artifact.declared_size);
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => cache.fetch(request).await,
                Err(e) => Err(MdrError::Generic(format!("Download limiter closed: {e}"))),
            };
            (id, index, artifact, result)
        });
    }

    let mut fetched: Vec<Fetched> = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let item = joined.map_err(|e| MdrError::Generic(format!("Download task failed: {e}")))?;
        if matches!(item.3, Err(MdrError::Cancelled)) {
            join_set.abort_all();
            return Err(MdrError::Cancelled);
        }
        fetched.push(item);
    }
    fetched.sort_by_key(|(id, index, _, _)| (*id, *index));

    let repositories = settings
        .cache
        .client()
        .repositories()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    for (id, _, artifact, result) in fetched {
        let node = graph.node_mut(id);
        match result {
            Ok(Some(cached)) => {
                for warning in cached.warnings {
                    node.push_message(warning);
                }
                if let Some(maven) = node.as_maven_mut() {
                    maven.files.push(cached.file);
                }
            }
            Ok(None) if artifact.optional => {
                debug!("Optional artifact {} is not available", artifact.path);
                node.push_message(Message::info(
                    "OptionalArtifactMissing",
                    format!("{} was not found in any repository", artifact.file_name),
                ));
            }
            Ok(None) => {
                let err = MdrError::NotFoundInRepository(artifact.path.clone(), repositories.clone());
                warn!("{}", err);
                node.push_error(&err);
            }
            Err(e) => {
                warn!("Failed to download {}: {}", artifact.path, e);
                node.push_error(&e);
            }
        }
    }
    Ok(())
}
