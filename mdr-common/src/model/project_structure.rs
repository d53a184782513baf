// mdr-common/src/model/project_structure.rs
//! Kotlin Multiplatform `kotlin-project-structure-metadata.json`, shipped inside the
//! metadata jar of a multiplatform library.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{MdrError, Result};

/// Location of the document inside the metadata jar.
pub const PROJECT_STRUCTURE_ENTRY: &str = "META-INF/kotlin-project-structure-metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KotlinProjectStructureMetadata {
    pub project_structure: ProjectStructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_published_as_root: Option<String>,
    #[serde(default)]
    pub variants: Vec<StructureVariant>,
    #[serde(default)]
    pub source_sets: Vec<SourceSet>,
}

/// Maps a published variant (`jvmApiElements`) to the source sets it is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureVariant {
    pub name: String,
    #[serde(default)]
    pub source_set: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSet {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// `group:module` of the dependencies declared by this source set.
    #[serde(default)]
    pub module_dependency: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_layout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_specific: Option<String>,
}

impl KotlinProjectStructureMetadata {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MdrError::MalformedMetadata("kotlin-project-structure-metadata".to_string(), e.to_string())
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(MdrError::from)
    }
}

impl ProjectStructure {
    fn source_set(&self, name: &str) -> Option<&SourceSet> {
        self.source_sets.iter().find(|s| s.name == name)
    }

    /// Source sets visible to a variant: its own and everything they depend on.
    pub fn closure_of_variant(&self, variant_name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = self
            .variants
            .iter()
            .filter(|v| v.name == variant_name)
            .flat_map(|v| v.source_set.iter().cloned())
            .collect();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(set) = self.source_set(&name) {
                stack.extend(set.depends_on.iter().cloned());
            }
        }
        seen
    }

    /// Source sets shared by every listed variant (e.g. `commonMain` plus
    /// `nativeMain` for two native targets).
    pub fn common_source_sets<'a>(&self, variant_names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut result: Option<BTreeSet<String>> = None;
        for name in variant_names {
            let closure = self.closure_of_variant(name);
            result = Some(match result {
                None => closure,
                Some(acc) => acc.intersection(&closure).cloned().collect(),
            });
        }
        result.unwrap_or_default()
    }

    /// `group:module` dependencies declared by the given source sets, deduplicated and sorted.
    pub fn module_dependencies<'a>(&self, source_sets: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let by_name: HashMap<&str, &SourceSet> =
            self.source_sets.iter().map(|s| (s.name.as_str(), s)).collect();
        let deps: BTreeSet<String> = source_sets
            .into_iter()
            .filter_map(|name| by_name.get(name.as_str()))
            .flat_map(|s| s.module_dependency.iter().cloned())
            .collect();
        deps.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
  "projectStructure": {
    "formatVersion": "0.3.3",
    "isPublishedAsRoot": "true",
    "variants": [
      { "name": "jvmApiElements", "sourceSet": ["jvmMain"] },
      { "name": "iosArm64ApiElements", "sourceSet": ["iosMain"] },
      { "name": "linuxX64ApiElements", "sourceSet": ["linuxX64Main"] }
    ],
    "sourceSets": [
      { "name": "commonMain", "dependsOn": [], "moduleDependency": ["org.jetbrains.kotlin:kotlin-stdlib"], "binaryLayout": "klib" },
      { "name": "concurrentMain", "dependsOn": ["commonMain"], "moduleDependency": ["org.jetbrains.kotlinx:atomicfu"] },
      { "name": "jvmMain", "dependsOn": ["concurrentMain"], "moduleDependency": [] },
      { "name": "nativeMain", "dependsOn": ["concurrentMain"], "moduleDependency": ["org.jetbrains.kotlinx:atomicfu"] },
      { "name": "iosMain", "dependsOn": ["nativeMain"], "moduleDependency": [] },
      { "name": "linuxX64Main", "dependsOn": ["nativeMain"], "moduleDependency": [] }
    ]
  }
}"#;

    #[test]
    fn shared_source_sets_are_intersected() {
        let metadata = KotlinProjectStructureMetadata::parse(SAMPLE.as_bytes()).unwrap();
        let ps = &metadata.project_structure;
        let native = ps.common_source_sets(["iosArm64ApiElements", "linuxX64ApiElements"]);
        assert_eq!(
            native.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["commonMain", "concurrentMain", "nativeMain"]
        );
        let all = ps.common_source_sets(["jvmApiElements", "iosArm64ApiElements"]);
        assert_eq!(all.len(), 2);
        assert_eq!(
            ps.module_dependencies(&all),
            vec!["org.jetbrains.kotlin:kotlin-stdlib", "org.jetbrains.kotlinx:atomicfu"]
        );
    }

    #[test]
    fn round_trip_is_stable() {
        let first = KotlinProjectStructureMetadata::parse(SAMPLE.as_bytes()).unwrap();
        let second = KotlinProjectStructureMetadata::parse(first.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(first, second);
    }
}
