// src/model/mod.rs
// Coordinates, versions and the three metadata formats a repository serves.
pub mod artifact;
pub mod coordinates;
pub mod gradle_module;
pub mod maven_metadata;
pub mod platform;
pub mod pom;
pub mod project_structure;
pub mod repository;
pub mod version;

// Re-export
pub use artifact::{HashAlgorithm, Hashes, ResolvedFile};
pub use coordinates::{Coordinates, ModuleKey};
pub use gradle_module::GradleModule;
pub use platform::{PlatformType, ResolutionPlatform, ResolutionScope};
pub use pom::Project;
pub use project_structure::KotlinProjectStructureMetadata;
pub use repository::Repository;
pub use version::{Version, VersionConstraint, VersionRange};
