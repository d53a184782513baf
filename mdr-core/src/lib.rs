// mdr-core/src/lib.rs

pub mod api;
pub mod cache;
pub mod constraints;
pub mod context;
pub mod descriptor;
pub mod download;
pub mod kmp;
pub mod lock;
pub mod metadata;
pub mod resolver;
pub mod variant;

// Re-export key types for easier use by the CLI crate
pub use api::{MavenResolver, ModuleRequest, ResolutionOutcome, ResolutionPolicy, ResolutionRequest};
pub use cache::{CachedFile, FileCache, FileRequest};
pub use context::{build_file_cache, build_file_cache_with, ResolutionSettings};
pub use resolver::{GraphRequest, ModuleDependencyNode, Resolver};
