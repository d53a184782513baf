// mdr-common/src/lib.rs
pub mod cache;
pub mod config;
pub mod dependency;
pub mod error;
pub mod model;

// Re-export key types
pub use cache::{Cache, CacheKey, FileKind};
pub use config::Config;
pub use error::{MdrError, Result};
pub use model::{Coordinates, ModuleKey, Repository, ResolutionPlatform, ResolutionScope};
