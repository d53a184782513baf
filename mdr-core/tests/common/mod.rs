// Shared fixtures: throwaway Maven-layout repositories and cache roots.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mdr_aio::hash_bytes;
use mdr_common::config::Config;
use mdr_common::error::Result;
use mdr_common::model::{Coordinates, HashAlgorithm, Repository};
use mdr_core::MavenResolver;
use mdr_net::{FetchOutcome, Transport};
use tempfile::TempDir;

pub fn coords(raw: &str) -> Coordinates {
    Coordinates::parse(raw).unwrap()
}

/// Repository path of `group:module:version` with `extension`.
pub fn file_path(gav: &str, extension: &str) -> String {
    coords(gav).file_path(None, extension).unwrap()
}

pub fn pom(gav: &str, packaging: &str, body: &str) -> String {
    let c = coords(gav);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project>\n  <modelVersion>4.0.0</modelVersion>\n  \
         <groupId>{}</groupId>\n  <artifactId>{}</artifactId>\n  <version>{}</version>\n  \
         <packaging>{packaging}</packaging>\n{body}\n</project>\n",
        c.group,
        c.module,
        c.version.unwrap_or_default()
    )
}

/// `<dependencies>` block; each entry is `group:module[:version]`.
pub fn dependencies(entries: &[&str]) -> String {
    let mut out = String::from("  <dependencies>\n");
    for entry in entries {
        let parts: Vec<&str> = entry.split(':').collect();
        out.push_str(&format!(
            "    <dependency><groupId>{}</groupId><artifactId>{}</artifactId>",
            parts[0], parts[1]
        ));
        if let Some(version) = parts.get(2) {
            out.push_str(&format!("<version>{version}</version>"));
        }
        out.push_str("</dependency>\n");
    }
    out.push_str("  </dependencies>");
    out
}

pub fn listing(versions: &[&str]) -> String {
    let versions: String = versions.iter().map(|v| format!("<version>{v}</version>")).collect();
    format!("<metadata><versioning><versions>{versions}</versions></versioning></metadata>")
}

/// Files of a repository keyed by repository path.
#[derive(Debug, Clone, Default)]
pub struct RepoContent {
    pub files: HashMap<String, Vec<u8>>,
}

impl RepoContent {
    /// Adds `path` together with its `.sha1` checksum file.
    pub fn put(&mut self, path: &str, bytes: &[u8]) -> &mut Self {
        self.files.insert(format!("{path}.sha1"), hash_bytes(HashAlgorithm::Sha1, bytes).into_bytes());
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }

    /// Adds `path` with a checksum file that does not match its content.
    pub fn put_corrupt(&mut self, path: &str, bytes: &[u8]) -> &mut Self {
        self.files.insert(format!("{path}.sha1"), hash_bytes(HashAlgorithm::Sha1, b"other").into_bytes());
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }

    /// A jar library whose dependencies are `group:module[:version]` strings.
    pub fn library(&mut self, gav: &str, deps: &[&str]) -> &mut Self {
        self.put(&file_path(gav, "pom"), pom(gav, "jar", &dependencies(deps)).as_bytes());
        self.put(&file_path(gav, "jar"), format!("jar of {gav}").as_bytes())
    }

    /// A BOM managing `group:module:version` entries.
    pub fn bom(&mut self, gav: &str, managed: &[&str]) -> &mut Self {
        let body = format!("  <dependencyManagement>\n{}\n  </dependencyManagement>", dependencies(managed));
        self.put(&file_path(gav, "pom"), pom(gav, "pom", &body).as_bytes())
    }

    pub fn versions(&mut self, group_module: &str, versions: &[&str]) -> &mut Self {
        let path = format!("{}/maven-metadata.xml", coords(group_module).key().path());
        self.put(&path, listing(versions).as_bytes())
    }

    pub fn write_to(&self, root: &Path) {
        for (path, bytes) in &self.files {
            let target = root.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, bytes).unwrap();
        }
    }
}

/// A local repository and an empty cache root, removed on drop.
pub struct Fixture {
    pub repo: TempDir,
    pub cache: TempDir,
}

impl Fixture {
    pub fn new(content: &RepoContent) -> Self {
        let repo = tempfile::tempdir().unwrap();
        content.write_to(repo.path());
        Self { repo, cache: tempfile::tempdir().unwrap() }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::with_cache_root(self.cache.path());
        config.repositories = vec![Repository::Local(self.repo.path().to_path_buf())];
        config
    }

    pub fn resolver(&self) -> MavenResolver {
        MavenResolver::new(self.config()).unwrap()
    }
}

/// A resolver reading from an in-memory remote repository, with a fresh cache root.
pub fn remote_resolver(transport: Arc<CountingTransport>) -> (MavenResolver, TempDir) {
    let cache = tempfile::tempdir().unwrap();
    let mut config = Config::with_cache_root(cache.path());
    config.repositories = vec![Repository::Remote("https://repo.example.test/maven2".to_string())];
    (MavenResolver::with_transport(config, transport).unwrap(), cache)
}

/// In-memory repository that counts every read per path. While stalled, reads wait
/// until [`CountingTransport::release`] is called.
#[derive(Debug, Default)]
pub struct CountingTransport {
    files: HashMap<String, Vec<u8>>,
    reads: Mutex<HashMap<String, usize>>,
    stalled: AtomicBool,
}

impl CountingTransport {
    pub fn new(content: &RepoContent) -> Arc<Self> {
        Arc::new(Self { files: content.files.clone(), ..Default::default() })
    }

    pub fn stalled(content: &RepoContent) -> Arc<Self> {
        let transport = Self { files: content.files.clone(), ..Default::default() };
        transport.stalled.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn release(&self) {
        self.stalled.store(false, Ordering::SeqCst);
    }

    pub fn reads(&self, path: &str) -> usize {
        self.reads.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn get(&self, _repository: &Repository, path: &str) -> Result<FetchOutcome> {
        *self.reads.lock().unwrap().entry(path.to_string()).or_default() += 1;
        while self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Give concurrent callers a chance to overlap.
        tokio::task::yield_now().await;
        Ok(match self.files.get(path) {
            Some(bytes) => FetchOutcome::Found(bytes.clone()),
            None => FetchOutcome::NotFound,
        })
    }
}
