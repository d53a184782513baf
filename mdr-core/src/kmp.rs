// mdr-core/src/kmp.rs
//! Kotlin multiplatform helpers: reading the project structure out of a metadata jar
//! and working out which source sets, and therefore which dependencies, every requested
//! platform shares.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use mdr_common::error::{MdrError, Result};
use mdr_common::model::project_structure::{ProjectStructure, PROJECT_STRUCTURE_ENTRY};
use mdr_common::model::{GradleModule, KotlinProjectStructureMetadata, ModuleKey, ResolutionPlatform, ResolutionScope};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::variant::{published_name, select_variant, VariantQuery};

/// Source sets common to all requested platforms and the modules they depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedSourceSets {
    pub source_sets: Vec<String>,
    pub modules: Vec<ModuleKey>,
}

/// Reads `kotlin-project-structure-metadata.json` from a metadata jar. `Ok(None)` when
/// the jar does not contain one.
pub async fn read_project_structure(jar: &Path) -> Result<Option<KotlinProjectStructureMetadata>> {
    let jar: PathBuf = jar.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = File::open(&jar)?;
        let mut archive = ZipArchive::new(file).map_err(|e| zip_error(&jar, e))?;
        let mut entry = match archive.by_name(PROJECT_STRUCTURE_ENTRY) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                debug!("{} has no {}", jar.display(), PROJECT_STRUCTURE_ENTRY);
                return Ok(None);
            }
            Err(e) => return Err(zip_error(&jar, e)),
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        KotlinProjectStructureMetadata::parse(&bytes).map(Some)
    })
    .await
    .map_err(|e| MdrError::Generic(format!("Task join error reading {PROJECT_STRUCTURE_ENTRY}: {e}")))?
}

fn zip_error(jar: &Path, e: ZipError) -> MdrError {
    MdrError::Zip(format!("{}: {e}", jar.display()))
}

/// Names, as recorded in the project structure, of the variants each platform selects.
pub fn platform_variant_names(
    module: &GradleModule,
    platforms: &[ResolutionPlatform],
    scope: ResolutionScope,
) -> Result<Vec<String>> {
    platforms
        .iter()
        .map(|platform| {
            let query = VariantQuery { platform: *platform, scope };
            select_variant(module, &query).map(|v| published_name(&v.name).to_string())
        })
        .collect()
}

pub fn shared_source_sets(structure: &ProjectStructure, variant_names: &[String]) -> SharedSourceSets {
    let source_sets = structure.common_source_sets(variant_names.iter().map(String::as_str));
    let modules = structure
        .module_dependencies(source_sets.iter())
        .into_iter()
        .filter_map(|raw| {
            raw.split_once(':')
                .map(|(group, module)| ModuleKey::new(group.trim(), module.trim()))
        })
        .collect();
    SharedSourceSets { source_sets: source_sets.into_iter().collect(), modules }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    const STRUCTURE: &str = r#"{
  "projectStructure": {
    "variants": [
      { "name": "jvmApiElements", "sourceSet": ["jvmMain"] },
      { "name": "iosArm64ApiElements", "sourceSet": ["iosArm64Main"] },
      { "name": "linuxX64ApiElements", "sourceSet": ["linuxX64Main"] }
    ],
    "sourceSets": [
      { "name": "commonMain", "dependsOn": [], "moduleDependency": ["org.jetbrains.kotlin:kotlin-stdlib"] },
      { "name": "nativeMain", "dependsOn": ["commonMain"], "moduleDependency": ["org.jetbrains.kotlinx:atomicfu"] },
      { "name": "jvmMain", "dependsOn": ["commonMain"], "moduleDependency": ["org.slf4j:slf4j-api"] },
      { "name": "iosArm64Main", "dependsOn": ["nativeMain"] },
      { "name": "linuxX64Main", "dependsOn": ["nativeMain"] }
    ]
  }
}"#;

    fn write_jar(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn reads_structure_from_metadata_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("lib-metadata.jar");
        write_jar(&jar, &[(PROJECT_STRUCTURE_ENTRY, STRUCTURE), ("commonMain/default/manifest", "")]);
        let metadata = read_project_structure(&jar).await.unwrap().unwrap();

        let native = shared_source_sets(
            &metadata.project_structure,
            &["iosArm64ApiElements".to_string(), "linuxX64ApiElements".to_string()],
        );
        assert_eq!(native.source_sets, vec!["commonMain".to_string(), "nativeMain".to_string()]);
        assert_eq!(
            native.modules,
            vec![
                ModuleKey::new("org.jetbrains.kotlin", "kotlin-stdlib"),
                ModuleKey::new("org.jetbrains.kotlinx", "atomicfu"),
            ]
        );

        let mixed = shared_source_sets(
            &metadata.project_structure,
            &["jvmApiElements".to_string(), "iosArm64ApiElements".to_string()],
        );
        assert_eq!(mixed.source_sets, vec!["commonMain".to_string()]);
        assert_eq!(mixed.modules, vec![ModuleKey::new("org.jetbrains.kotlin", "kotlin-stdlib")]);
    }

    #[tokio::test]
    async fn missing_entry_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("lib-metadata.jar");
        write_jar(&jar, &[("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n")]);
        assert!(read_project_structure(&jar).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_is_a_zip_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("lib-metadata.jar");
        std::fs::write(&jar, b"not a zip").unwrap();
        let err = read_project_structure(&jar).await.unwrap_err();
        assert_eq!(err.kind(), "Zip");
    }
}
